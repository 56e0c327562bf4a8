// Token issuing and introspection

pub mod token;
pub mod whoami;

pub use token::{issue_token, IssueTokenBody, IssuedToken};
pub use whoami::whoami;
