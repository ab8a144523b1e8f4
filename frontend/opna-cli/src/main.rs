mod config;

use crate::config::AppConfig;
use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use opna_config::WaveformResolution;
use opna_core::opna::{FM_SAMPLE_RATE_HZ, OPNA_CLOCK_HZ};
use opna_core::{Opna, RegisterWrite};
use std::path::PathBuf;

const CHUNK_FRAMES: usize = 1024;

#[derive(Parser)]
struct Args {
    /// TOML config file path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log-sine table resolution (standard / high); overrides the config file
    #[arg(long)]
    waveform_resolution: Option<WaveformResolution>,

    /// Register write in REG=VALUE form (hexadecimal), may be repeated
    #[arg(short = 'w', long = "write")]
    writes: Vec<RegisterWrite>,

    /// Key on a built-in voice on channel 1 at A4 before applying other command line writes
    #[arg(long, default_value_t)]
    demo_voice: bool,

    /// Number of stereo frames to render; overrides the config file
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Render into one interleaved buffer instead of separate left/right buffers
    #[arg(long, default_value_t)]
    interleaved: bool,

    /// Print every rendered frame to stdout as "L R"
    #[arg(long, default_value_t)]
    dump: bool,
}

// Algorithm 4 (two 2-operator stacks), A4 on channel 1
fn demo_voice() -> Vec<RegisterWrite> {
    let mut writes = vec![RegisterWrite::new(0xB0, 0x3C), RegisterWrite::new(0xB4, 0xC0)];

    // DT/MUL, TL, KS/AR, DR, SR, SL/RR for slots 1-4
    let operators: [[u8; 6]; 4] = [
        [0x71, 0x23, 0x1F, 0x05, 0x02, 0x27],
        [0x31, 0x00, 0x1F, 0x0A, 0x03, 0x37],
        [0x32, 0x2A, 0x1F, 0x05, 0x02, 0x27],
        [0x01, 0x00, 0x1F, 0x0A, 0x03, 0x37],
    ];
    for (slot_bits, values) in [0x0, 0x8, 0x4, 0xC].into_iter().zip(operators) {
        for (register, value) in (0x30..=0x80).step_by(0x10).zip(values) {
            writes.push(RegisterWrite::new(register | slot_bits, value));
        }
    }

    writes.extend(RegisterWrite::block_f_number(0, 4, 0x410).into_iter().flatten());
    writes.extend(RegisterWrite::key_on_or_off(0, 0x0F));
    writes
}

#[derive(Debug, Default)]
struct ChannelStats {
    peak: i32,
    sum_of_squares: f64,
}

impl ChannelStats {
    fn add(&mut self, sample: i32) {
        self.peak = self.peak.max(sample.abs());
        self.sum_of_squares += f64::from(sample) * f64::from(sample);
    }

    fn rms(&self, frames: usize) -> f64 {
        if frames == 0 { 0.0 } else { (self.sum_of_squares / frames as f64).sqrt() }
    }
}

fn describe_output(opna: &Opna, frames: usize) -> String {
    format!(
        "{frames} frames ({:.3}s at {FM_SAMPLE_RATE_HZ:.1} Hz, {OPNA_CLOCK_HZ} Hz master clock, {} \
         waveform resolution)",
        frames as f64 / FM_SAMPLE_RATE_HZ,
        opna.waveform_resolution()
    )
}

fn render(opna: &mut Opna, frames: usize, interleaved: bool, dump: bool) -> [ChannelStats; 2] {
    let mut stats = [ChannelStats::default(), ChannelStats::default()];
    let mut l_buffer = vec![0; CHUNK_FRAMES];
    let mut r_buffer = vec![0; CHUNK_FRAMES];
    let mut interleaved_buffer = vec![0; 2 * CHUNK_FRAMES];

    let mut remaining = frames;
    while remaining != 0 {
        let chunk_len = remaining.min(CHUNK_FRAMES);
        remaining -= chunk_len;

        let l = &mut l_buffer[..chunk_len];
        let r = &mut r_buffer[..chunk_len];
        if interleaved {
            let buffer = &mut interleaved_buffer[..2 * chunk_len];
            opna.generate_interleaved(buffer);
            for (i, frame) in buffer.chunks_exact(2).enumerate() {
                (l[i], r[i]) = (frame[0], frame[1]);
            }
        } else {
            opna.generate_stereo(l, r);
        }

        for (&sample_l, &sample_r) in l.iter().zip(r.iter()) {
            stats[0].add(sample_l);
            stats[1].add(sample_r);

            if dump {
                println!("{sample_l} {sample_r}");
            }
        }
    }

    stats
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::default(),
    };
    if let Some(waveform_resolution) = args.waveform_resolution {
        config.opna.waveform_resolution = waveform_resolution;
    }
    if let Some(frames) = args.frames {
        config.frames = frames;
    }

    log::info!("Running with config: {config:?}");

    let mut opna = Opna::new_from_config(&config.opna);

    for write in &config.writes {
        let write: RegisterWrite =
            write.parse().with_context(|| format!("Invalid register write in config: {write}"))?;
        opna.write(write.register, write.value);
    }

    if args.demo_voice {
        for write in demo_voice() {
            opna.write(write.register, write.value);
        }
    }

    for write in &args.writes {
        log::debug!("Applying register write {write}");
        opna.write(write.register, write.value);
    }

    let [stats_l, stats_r] = render(&mut opna, config.frames, args.interleaved, args.dump);

    log::info!("Rendered {}", describe_output(&opna, config.frames));
    log::info!("L: peak {}, RMS {:.1}", stats_l.peak, stats_l.rms(config.frames));
    log::info!("R: peak {}, RMS {:.1}", stats_r.peak, stats_r.rms(config.frames));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn demo_voice_is_audible() {
        let mut opna = Opna::new(WaveformResolution::High);
        for write in demo_voice() {
            opna.write(write.register, write.value);
        }

        let [l, r] = render(&mut opna, 5000, false, false);
        assert!(l.peak > 0);
        assert_eq!(l.peak, r.peak);
        assert!(l.peak <= 2 * 8168);
    }

    #[test]
    fn interleaved_render_matches_planar() {
        let mut planar = Opna::new(WaveformResolution::High);
        for write in demo_voice() {
            planar.write(write.register, write.value);
        }
        let mut interleaved = planar.clone();

        let [planar_l, _] = render(&mut planar, 3000, false, false);
        let [interleaved_l, _] = render(&mut interleaved, 3000, true, false);
        assert_eq!(planar_l.peak, interleaved_l.peak);
        assert!((planar_l.rms(3000) - interleaved_l.rms(3000)).abs() < 1e-9);
    }

    #[test]
    fn output_description_reflects_device() {
        let description = describe_output(&Opna::new(WaveformResolution::Standard), 55_466);
        assert!(description.starts_with("55466 frames (1.000s at 55466.7 Hz"), "{description}");
        assert!(description.contains("7987200 Hz master clock"), "{description}");
        assert!(
            description.contains(&format!("{} waveform", WaveformResolution::Standard)),
            "{description}"
        );
    }

    #[test]
    fn parses_args() {
        let args = Args::try_parse_from([
            "opna-cli",
            "-w",
            "B0=07",
            "--write",
            "0x28=0xF0",
            "--waveform-resolution",
            "standard",
            "-n",
            "10",
        ])
        .unwrap();

        assert_eq!(
            args.writes,
            vec![RegisterWrite::new(0xB0, 0x07), RegisterWrite::new(0x28, 0xF0)]
        );
        assert_eq!(args.waveform_resolution, Some(WaveformResolution::Standard));
        assert_eq!(args.frames, Some(10));
        assert!(Args::try_parse_from(["opna-cli", "-w", "B0"]).is_err());
    }
}
