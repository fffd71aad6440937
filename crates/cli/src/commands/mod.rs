pub mod describe;
pub mod invalidate;
pub mod run;
pub mod util;

pub use describe::*;
pub use invalidate::*;
pub use run::*;
pub use util::*;
