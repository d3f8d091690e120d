//! # Inbound panel messages.
//!
//! The panel speaks line-oriented ASCII packets:
//!
//! ```text
//! 16XK2636115020605110006F
//! ││││└─ payload + checksum (opaque here)
//! │││└── sub-message type
//! ││└─── message type
//! └┴──── two hex digits of packet length
//! ```
//!
//! Only the type pair is interpreted: it becomes the stored command code and
//! identifies heartbeats (`XK`). Everything else stays opaque in `raw`.

use std::fmt;

/// One inbound packet, kept verbatim plus its classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    raw: String,
    message_type: Option<char>,
    sub_message_type: Option<char>,
}

impl Message {
    /// Parses a line received from the panel.
    ///
    /// Never fails: lines without the length prefix or the type pair keep
    /// their raw text and simply carry no command.
    ///
    /// # Example
    /// ```
    /// use elkvisor::Message;
    ///
    /// let hb = Message::parse("16XK2636115020605110006F\r\n");
    /// assert_eq!(hb.raw(), "16XK2636115020605110006F");
    /// assert_eq!(hb.command().as_deref(), Some("XK"));
    /// assert!(hb.is_heartbeat());
    ///
    /// let junk = Message::parse("hello");
    /// assert_eq!(junk.command(), None);
    /// ```
    pub fn parse(line: &str) -> Self {
        let raw = line.trim_end_matches(['\r', '\n']).to_string();
        let mut chars = raw.chars();
        let prefixed = matches!(
            (chars.next(), chars.next()),
            (Some(a), Some(b)) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit()
        );
        let (message_type, sub_message_type) = if prefixed {
            (
                chars.next().filter(char::is_ascii_alphabetic),
                chars.next().filter(char::is_ascii_alphabetic),
            )
        } else {
            (None, None)
        };
        Self {
            raw,
            message_type,
            sub_message_type,
        }
    }

    /// Builds a message from already-classified parts.
    pub fn new(
        raw: impl Into<String>,
        message_type: Option<char>,
        sub_message_type: Option<char>,
    ) -> Self {
        Self {
            raw: raw.into(),
            message_type,
            sub_message_type,
        }
    }

    /// The packet text without line terminator.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn message_type(&self) -> Option<char> {
        self.message_type
    }

    pub fn sub_message_type(&self) -> Option<char> {
        self.sub_message_type
    }

    /// Concatenated type pair (e.g. `"XK"`), or `None` when neither is known.
    pub fn command(&self) -> Option<String> {
        if self.message_type.is_none() && self.sub_message_type.is_none() {
            return None;
        }
        Some(
            self.message_type
                .into_iter()
                .chain(self.sub_message_type)
                .collect(),
        )
    }

    /// True for the keep-alive class (`XK`).
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == Some('X') && self.sub_message_type == Some('K')
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
