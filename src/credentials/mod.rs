//! 4.C Credential store: a directory holding a live `pass` file and a
//! pending `pass.new` file, each in `host:port:db:role:password` form.

mod line;
mod store;

pub use line::CredentialLine;
pub use store::{ChangeCallback, CredentialStore, Finalizer};
