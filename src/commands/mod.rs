//! CLI commands implementation

pub mod init;
pub mod mappings;
pub mod normalize;
pub mod rules;
pub mod run;
pub mod runs;
pub mod status;
pub mod sync;

pub use init::*;
pub use mappings::*;
pub use normalize::*;
pub use rules::*;
pub use run::*;
pub use runs::*;
pub use status::*;
pub use sync::*;
