pub mod request;
pub mod stdin_listener;

pub use request::{Request, RequestError, Response};
pub use stdin_listener::{InputClosed, StdinListener};
