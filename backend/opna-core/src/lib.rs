pub mod opna;
pub mod register;
pub mod shared;

pub use opna::{Channel3Mode, FmChannel, FmOperator, Opna};
pub use opna_config::{OpnaConfig, WaveformResolution};
pub use register::{ParseRegisterWriteError, RegisterWrite};
pub use shared::SharedOpna;
