//! Command-line grammar of the client
//!
//! `pikv-client [<ip>|localhost] [<VERB>] <key> [<value>]`, tokens in any
//! order. A token is a host if it is `localhost` or a dotted quad, a verb if
//! it names one case-insensitively, otherwise the key and then the value.

use crate::error::{PikvError, Result};
use crate::protocol::{Command, Verb};

/// Host used when none is given
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const USAGE: &str = "\
Invalid command format.
Usage:
       pikv-client [<ip>|localhost] [<COMMAND>] <key> [<value>]
       Commands: INSERT, UPDATE, DELETE, GET (INSERT when omitted)
       INSERT and UPDATE need a key and a value; GET and DELETE need a key only
       Options such as --port go before the command tokens";

/// What the client was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub host: String,
    pub command: Command,
}

/// Classify command-line tokens into an [`Invocation`]
pub fn parse_invocation<I, S>(tokens: I) -> Result<Invocation>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut host = DEFAULT_HOST.to_string();
    let mut verb = Verb::Insert;
    let mut key: Option<String> = None;
    let mut value: Option<String> = None;

    for token in tokens {
        let token = token.as_ref();

        if let Some(addr) = host_token(token) {
            host = addr;
        } else if let Some(v) = Verb::from_token(token) {
            verb = v;
        } else if key.is_none() {
            key = Some(token.to_string());
        } else if value.is_none() {
            value = Some(token.to_string());
        } else {
            return Err(PikvError::Usage(format!("unexpected argument {:?}", token)));
        }
    }

    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| PikvError::Usage(format!("{} needs a key", verb)))?;
    let value = value.filter(|v| !v.is_empty());

    match (verb.takes_value(), &value) {
        (true, None) => {
            return Err(PikvError::Usage(format!("{} needs a value", verb)));
        }
        (false, Some(_)) => {
            return Err(PikvError::Usage(format!("{} takes no value", verb)));
        }
        _ => {}
    }

    Ok(Invocation {
        host,
        command: Command::new(verb, key, value),
    })
}

fn host_token(token: &str) -> Option<String> {
    if token == "localhost" {
        return Some(DEFAULT_HOST.to_string());
    }
    is_dotted_quad(token).then(|| token.to_string())
}

/// Four groups of one to three digits separated by dots
fn is_dotted_quad(token: &str) -> bool {
    let groups: Vec<&str> = token.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(tokens: &[&str]) -> Result<Invocation> {
        parse_invocation(tokens.iter().copied())
    }

    #[test]
    fn test_full_invocation() {
        let inv = parse(&["10.0.0.7", "insert", "k", "v"]).unwrap();
        assert_eq!(inv.host, "10.0.0.7");
        assert_eq!(inv.command, Command::insert("k", "v"));
    }

    #[test]
    fn test_tokens_in_any_order() {
        let inv = parse(&["k", "localhost", "v", "UPDATE"]).unwrap();
        assert_eq!(inv.host, "127.0.0.1");
        assert_eq!(inv.command, Command::update("k", "v"));
    }

    #[test]
    fn test_verb_defaults_to_insert() {
        let inv = parse(&["k", "v"]).unwrap();
        assert_eq!(inv.host, DEFAULT_HOST);
        assert_eq!(inv.command, Command::insert("k", "v"));
    }

    #[test]
    fn test_get_and_delete_take_key_only() {
        assert_eq!(parse(&["GET", "k"]).unwrap().command, Command::get("k"));
        assert_eq!(parse(&["delete", "k"]).unwrap().command, Command::delete("k"));

        assert!(matches!(parse(&["GET", "k", "v"]), Err(PikvError::Usage(_))));
        assert!(matches!(parse(&["DELETE"]), Err(PikvError::Usage(_))));
    }

    #[test]
    fn test_insert_and_update_need_value() {
        assert!(matches!(parse(&["INSERT", "k"]), Err(PikvError::Usage(_))));
        assert!(matches!(parse(&["UPDATE", "k", ""]), Err(PikvError::Usage(_))));
        assert!(matches!(parse(&[]), Err(PikvError::Usage(_))));
    }

    #[test]
    fn test_extra_token_is_rejected() {
        assert!(matches!(parse(&["INSERT", "k", "v", "w"]), Err(PikvError::Usage(_))));
    }

    #[test]
    fn test_later_verb_wins() {
        let inv = parse(&["GET", "k", "delete"]).unwrap();
        assert_eq!(inv.command, Command::delete("k"));
    }

    #[test]
    fn test_dotted_quad_detection() {
        assert!(is_dotted_quad("192.168.1.10"));
        assert!(is_dotted_quad("999.0.0.1"));
        assert!(!is_dotted_quad("1.2.3"));
        assert!(!is_dotted_quad("1.2.3.4.5"));
        assert!(!is_dotted_quad("a.b.c.d"));
        assert!(!is_dotted_quad("1..3.4"));
        assert!(!is_dotted_quad("1234.1.1.1"));
    }
}
