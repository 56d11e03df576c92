//! Fixed server-to-client notice lines.
//!
//! Every piece of text the server originates (as opposed to relaying) is
//! built here, so the exact wire wording lives in one place and the
//! integration tests can assert against these builders instead of string
//! literals scattered through the network layer.

/// The greeting written immediately after a connection is accepted.
pub fn nickname_prompt() -> &'static str {
    "Welcome to the chat! Please, type your nickname:"
}

/// Confirmation sent to a client once its display name is read.
pub fn name_confirmation(name: &str) -> String {
    format!("You are {name}")
}

/// Broadcast when a session is registered.
pub fn arrival_notice(name: &str) -> String {
    format!("{name} has arrived")
}

/// Broadcast when a session leaves, is evicted, or drops its connection.
pub fn departure_notice(name: &str) -> String {
    format!("{name} has left")
}

/// Roster line broadcast after every registration.
///
/// Names are sorted alphabetically so the output is deterministic regardless
/// of registry iteration order.
pub fn roster_notice(names: &[String]) -> String {
    let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("User(s) online: {}", sorted.join(", "))
}

/// The final line written to an idle client before its connection closes.
pub fn idle_warning() -> &'static str {
    "You've been idle for too long. Disconnecting..."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_confirmation_embeds_name() {
        assert_eq!(name_confirmation("alice"), "You are alice");
    }

    #[test]
    fn test_arrival_and_departure_notices() {
        assert_eq!(arrival_notice("bob"), "bob has arrived");
        assert_eq!(departure_notice("bob"), "bob has left");
    }

    #[test]
    fn test_roster_notice_sorts_names() {
        let names = vec![
            "carol".to_string(),
            "alice".to_string(),
            "bob".to_string(),
        ];
        assert_eq!(roster_notice(&names), "User(s) online: alice, bob, carol");
    }

    #[test]
    fn test_roster_notice_with_single_name() {
        assert_eq!(
            roster_notice(&["alice".to_string()]),
            "User(s) online: alice"
        );
    }

    #[test]
    fn test_roster_notice_keeps_duplicate_names() {
        // Duplicate nicknames are permitted, so the roster may legitimately
        // list the same name twice.
        let names = vec!["alice".to_string(), "alice".to_string()];
        assert_eq!(roster_notice(&names), "User(s) online: alice, alice");
    }

    #[test]
    fn test_idle_warning_wording() {
        assert_eq!(
            idle_warning(),
            "You've been idle for too long. Disconnecting..."
        );
    }
}
