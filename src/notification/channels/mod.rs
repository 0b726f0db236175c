//! 具体渠道实现

pub mod callback;
pub mod flock;
pub mod group;
pub mod print;
pub mod telegram;

pub use callback::{CallbackChannel, CallbackConfig};
pub use flock::{FlockChannel, FlockConfig};
pub use group::GroupChannel;
pub use print::{PrintChannel, PrintConfig};
pub use telegram::{ChatId, TelegramChannel, TelegramConfig};
