//! Terminal command parsing

use std::str::FromStr;

use sentinel_realtime::ExchangeId;
use thiserror::Error;

/// Usage lines, in the order shown by `/help`
pub const USAGE: &[&str] = &[
    "/type <peer>          keystroke in the conversation with <peer>",
    "/blur <peer>          leave the conversation with <peer>",
    "/sent <id> [read]     render the receipt of one of your messages",
    "/read <id> <from>     confirm you read a message from <from>",
    "/exchange <peer>      request a key exchange with <peer>",
    "/pending              list key exchange requests addressed to you",
    "/accept <id>          accept a pending key exchange",
    "/reject <id>          dismiss a pending key exchange",
    "/key <peer>           show the stored public key of <peer>",
    "/help                 show this help",
    "/quit                 leave",
];

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Type { peer: String },
    Blur { peer: String },
    Sent { message_id: String, read: bool },
    Read { message_id: String, from_user: String },
    Exchange { peer: String },
    Pending,
    Accept { id: ExchangeId },
    Reject { id: ExchangeId },
    Key { peer: String },
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("commands start with '/', try /help")]
    NotACommand,

    #[error("unknown command '{0}', try /help")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Err(ParseError::NotACommand);
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match (name.as_str(), args.as_slice()) {
            ("type", [peer]) => Self::Type {
                peer: peer.to_string(),
            },
            ("type", _) => return Err(ParseError::Usage("/type <peer>")),

            ("blur", [peer]) => Self::Blur {
                peer: peer.to_string(),
            },
            ("blur", _) => return Err(ParseError::Usage("/blur <peer>")),

            ("sent", [id]) => Self::Sent {
                message_id: id.to_string(),
                read: false,
            },
            ("sent", [id, flag]) if flag.eq_ignore_ascii_case("read") => Self::Sent {
                message_id: id.to_string(),
                read: true,
            },
            ("sent", _) => return Err(ParseError::Usage("/sent <id> [read]")),

            ("read", [id, from]) => Self::Read {
                message_id: id.to_string(),
                from_user: from.to_string(),
            },
            ("read", _) => return Err(ParseError::Usage("/read <id> <from>")),

            ("exchange", [peer]) => Self::Exchange {
                peer: peer.to_string(),
            },
            ("exchange", _) => return Err(ParseError::Usage("/exchange <peer>")),

            ("pending", []) => Self::Pending,
            ("pending", _) => return Err(ParseError::Usage("/pending")),

            ("accept", [id]) => Self::Accept {
                id: ExchangeId::from(*id),
            },
            ("accept", _) => return Err(ParseError::Usage("/accept <id>")),

            ("reject", [id]) => Self::Reject {
                id: ExchangeId::from(*id),
            },
            ("reject", _) => return Err(ParseError::Usage("/reject <id>")),

            ("key", [peer]) => Self::Key {
                peer: peer.to_string(),
            },
            ("key", _) => return Err(ParseError::Usage("/key <peer>")),

            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,

            (other, _) => return Err(ParseError::Unknown(other.to_string())),
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_conversation_commands() {
        assert_eq!(
            "/type bob".parse::<Command>().unwrap(),
            Command::Type {
                peer: "bob".to_string()
            }
        );
        assert_eq!(
            "  /BLUR bob  ".parse::<Command>().unwrap(),
            Command::Blur {
                peer: "bob".to_string()
            }
        );
    }

    #[test]
    fn test_parse_receipt_commands() {
        assert_eq!(
            "/sent m1".parse::<Command>().unwrap(),
            Command::Sent {
                message_id: "m1".to_string(),
                read: false
            }
        );
        assert_eq!(
            "/sent m1 read".parse::<Command>().unwrap(),
            Command::Sent {
                message_id: "m1".to_string(),
                read: true
            }
        );
        assert_eq!(
            "/read m2 carol".parse::<Command>().unwrap(),
            Command::Read {
                message_id: "m2".to_string(),
                from_user: "carol".to_string()
            }
        );
        assert_matches!("/sent m1 maybe".parse::<Command>(), Err(ParseError::Usage(_)));
    }

    #[test]
    fn test_parse_exchange_ids() {
        assert_eq!(
            "/accept 7".parse::<Command>().unwrap(),
            Command::Accept {
                id: ExchangeId::Number(7)
            }
        );
        assert_eq!(
            "/reject abc".parse::<Command>().unwrap(),
            Command::Reject {
                id: ExchangeId::Text("abc".to_string())
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("hello".parse::<Command>(), Err(ParseError::NotACommand));
        assert_eq!(
            "/dance".parse::<Command>(),
            Err(ParseError::Unknown("dance".to_string()))
        );
        assert_eq!(
            "/exchange".parse::<Command>(),
            Err(ParseError::Usage("/exchange <peer>"))
        );
        assert_eq!("/".parse::<Command>(), Err(ParseError::Unknown(String::new())));
    }

    #[test]
    fn test_parse_quit_aliases() {
        assert_eq!("/quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("/exit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("/help me".parse::<Command>().unwrap(), Command::Help);
    }
}
