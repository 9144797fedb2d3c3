//! Response definitions
//!
//! Response codes sent back to clients and notifications pushed to
//! subscribers.

/// Two-digit response codes of the session protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    ConnectOk,
    ConnectFailed,
    Disconnected,
    SubscribeKeyNotFound,
    Subscribed,
    Unsubscribed,
    SubscriptionNotFound,
    CommandOk,
    CommandRejected,
}

impl ResponseCode {
    /// Wire form: ASCII operation digit then ASCII result digit
    pub fn as_bytes(self) -> [u8; 2] {
        match self {
            ResponseCode::ConnectOk => *b"10",
            ResponseCode::ConnectFailed => *b"11",
            ResponseCode::Disconnected => *b"20",
            ResponseCode::SubscribeKeyNotFound => *b"30",
            ResponseCode::Subscribed => *b"31",
            ResponseCode::Unsubscribed => *b"40",
            ResponseCode::SubscriptionNotFound => *b"41",
            ResponseCode::CommandOk => *b"50",
            ResponseCode::CommandRejected => *b"51",
        }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        match &bytes {
            b"10" => Some(ResponseCode::ConnectOk),
            b"11" => Some(ResponseCode::ConnectFailed),
            b"20" => Some(ResponseCode::Disconnected),
            b"30" => Some(ResponseCode::SubscribeKeyNotFound),
            b"31" => Some(ResponseCode::Subscribed),
            b"40" => Some(ResponseCode::Unsubscribed),
            b"41" => Some(ResponseCode::SubscriptionNotFound),
            b"50" => Some(ResponseCode::CommandOk),
            b"51" => Some(ResponseCode::CommandRejected),
            _ => None,
        }
    }

    /// Whether a payload (length + text) follows the code
    pub fn has_payload(self) -> bool {
        matches!(self, ResponseCode::CommandOk | ResponseCode::CommandRejected)
    }
}

/// An event delivered to a key's subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The key was written; carries the new value
    Changed { key: String, value: String },

    /// The key was deleted
    Deleted { key: String },
}

impl Notification {
    pub fn key(&self) -> &str {
        match self {
            Notification::Changed { key, .. } | Notification::Deleted { key } => key,
        }
    }
}
