pub mod machine;
pub mod process;

pub use machine::{
    AppProcess, FirstRunInitializer, FirstRunReport, InitState, Launcher, ProcessExit, Timing,
};
pub use process::{SubprocessHandle, SubprocessLauncher};
