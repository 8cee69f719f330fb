pub mod ticket_manager;
pub mod timer_manager;
pub mod transcript;
pub mod verification_manager;

pub use ticket_manager::{
    create_shared_ticket_manager, SharedTicketManager, Ticket, TicketCategory,
};
pub use timer_manager::{create_shared_timer_manager, SharedTimerManager, TimerKey};
pub use verification_manager::{
    create_shared_verification_manager, SharedVerificationManager, SubmitOutcome,
};
