//! Command result text
//!
//! The textual results written for READ, DELETE, SHOW, WAIT and HELP, and
//! the line a client prints for a notification.

use super::{Notification, DELETED_MARKER};

/// Printed by WAIT before sleeping
pub const WAIT_MESSAGE: &str = "Waiting...\n";

/// Printed by HELP
pub const HELP_TEXT: &str = concat!(
    "Available commands:\n",
    "  WRITE [(key,value)(key2,value2),...]\n",
    "  READ [key,key2,...]\n",
    "  DELETE [key,key2,...]\n",
    "  SHOW\n",
    "  WAIT <delay_ms>\n",
    "  BACKUP\n",
    "  HELP\n",
);

/// `[(k,v)(k2,KVSERROR)]` for a READ, one pair per requested key
pub fn render_read(results: &[(String, Option<String>)]) -> String {
    let mut out = String::from("[");
    for (key, value) in results {
        match value {
            Some(value) => out.push_str(&format!("({},{})", key, value)),
            None => out.push_str(&format!("({},KVSERROR)", key)),
        }
    }
    out.push_str("]\n");
    out
}

/// `[(k,KVSMISSING)]` for a DELETE; empty when nothing was missing
pub fn render_missing(missing: &[String]) -> String {
    if missing.is_empty() {
        return String::new();
    }

    let mut out = String::from("[");
    for key in missing {
        out.push_str(&format!("({},KVSMISSING)", key));
    }
    out.push_str("]\n");
    out
}

/// One SHOW / backup line
pub fn render_show_line(key: &str, value: &str) -> String {
    format!("({}, {})\n", key, value)
}

/// `(key,value)` as printed by a client, `(key,DELETED)` for deletions
pub fn render_notification(notification: &Notification) -> String {
    match notification {
        Notification::Changed { key, value } => format!("({},{})", key, value),
        Notification::Deleted { key } => format!("({},{})", key, DELETED_MARKER),
    }
}
