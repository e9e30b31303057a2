pub mod id;
pub mod init;
pub mod run;
pub mod version;

pub use id::Id;
pub use init::Init;
pub use run::Run;
pub use version::Version;
