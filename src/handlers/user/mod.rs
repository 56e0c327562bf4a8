// User lifecycle functions

pub mod invite;
pub mod on_create;

pub use invite::{invite_user, InviteUserBody};
pub use on_create::{on_user_create, UserRecord, USERS_COLLECTION};
