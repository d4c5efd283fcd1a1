pub mod chat;
pub mod chats;
pub mod identity;
pub mod init;
pub mod presence;
pub mod register;
pub mod version;

pub use chat::Chat;
pub use chats::Chats;
pub use identity::Identity;
pub use init::Init;
pub use presence::Presence;
pub use register::Register;
pub use version::Version;
