pub mod general;
pub mod ticket;
pub mod verification;

pub use general::{ip, players, status, version};
pub use ticket::{embed, ticket};
pub use verification::verificacion;
