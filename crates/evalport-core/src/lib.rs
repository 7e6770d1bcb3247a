pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use config::*;
pub use error::*;
pub use session::*;
pub use spec::*;
pub use tensor::*;
