pub mod booking;
pub mod tenant;
pub mod turn;

pub use booking::{Booking, BookingStatus, BOOKING_DURATION_MIN};
pub use tenant::Tenant;
pub use turn::ConversationTurn;
