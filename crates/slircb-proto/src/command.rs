//! IRC command types.
//!
//! Type-safe representations of the commands the bouncer handles itself.
//! Everything else is captured in the [`Command::Raw`] variant and relayed
//! verbatim, which is exactly what a bouncer wants for traffic it does not
//! interpret.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol

use std::fmt;

use crate::response::Response;

/// IRC command with its parameters.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Command {
    // === Connection Registration (RFC 2812 Section 3.1) ===
    /// `PASS password`
    PASS(String),
    /// `NICK nickname`
    NICK(String),
    /// `USER username mode realname`
    USER(String, String, String),
    /// `QUIT [message]`
    QUIT(Option<String>),

    // === Channel Operations ===
    /// `JOIN channels [keys]`
    JOIN(String, Option<String>),

    // === Messaging ===
    /// `PRIVMSG target text`
    PRIVMSG(String, String),
    /// `NOTICE target text`
    NOTICE(String, String),

    // === Keepalive ===
    /// `PING server [server2]`
    PING(String, Option<String>),
    /// `PONG server [server2]`
    PONG(String, Option<String>),

    /// `ERROR message`
    ERROR(String),

    /// Numeric reply: `<code> args...`
    Response(Response, Vec<String>),

    /// Any command this crate does not model, kept verbatim.
    Raw(String, Vec<String>),
}

impl Command {
    /// Build a command from its name and parameters.
    ///
    /// Unknown commands and known commands with unexpected arity fall
    /// through to [`Command::Raw`] so that relayed traffic survives intact.
    pub fn new(cmd: &str, args: Vec<&str>) -> Command {
        let raw = |cmd: &str, args: Vec<&str>| {
            Command::Raw(
                cmd.to_string(),
                args.into_iter().map(|s| s.to_string()).collect(),
            )
        };

        if let Ok(code) = cmd.parse::<u16>() {
            return match Response::from_code(code) {
                Some(resp) => {
                    Command::Response(resp, args.into_iter().map(|s| s.to_string()).collect())
                }
                None => raw(cmd, args),
            };
        }

        match (cmd.to_ascii_uppercase().as_str(), args.len()) {
            ("PASS", 1) => Command::PASS(args[0].to_string()),
            // The whole parameter text is the candidate: a nickname with an
            // embedded space must reach validation intact so the rejection
            // can reference it.
            ("NICK", n) if n >= 1 => Command::NICK(args.join(" ")),
            ("USER", 4) => Command::USER(
                args[0].to_string(),
                args[1].to_string(),
                args[3].to_string(),
            ),
            ("QUIT", 0) => Command::QUIT(None),
            ("QUIT", 1) => Command::QUIT(Some(args[0].to_string())),
            ("JOIN", 1) => Command::JOIN(args[0].to_string(), None),
            ("JOIN", 2) => Command::JOIN(args[0].to_string(), Some(args[1].to_string())),
            ("PRIVMSG", 2) => Command::PRIVMSG(args[0].to_string(), args[1].to_string()),
            ("NOTICE", 2) => Command::NOTICE(args[0].to_string(), args[1].to_string()),
            ("PING", 1) => Command::PING(args[0].to_string(), None),
            ("PING", 2) => Command::PING(args[0].to_string(), Some(args[1].to_string())),
            ("PONG", 1) => Command::PONG(args[0].to_string(), None),
            ("PONG", 2) => Command::PONG(args[0].to_string(), Some(args[1].to_string())),
            ("ERROR", 1) => Command::ERROR(args[0].to_string()),
            _ => raw(cmd, args),
        }
    }

    /// The command name as it appears on the wire.
    pub fn name(&self) -> String {
        match self {
            Command::PASS(_) => "PASS".to_string(),
            Command::NICK(_) => "NICK".to_string(),
            Command::USER(..) => "USER".to_string(),
            Command::QUIT(_) => "QUIT".to_string(),
            Command::JOIN(..) => "JOIN".to_string(),
            Command::PRIVMSG(..) => "PRIVMSG".to_string(),
            Command::NOTICE(..) => "NOTICE".to_string(),
            Command::PING(..) => "PING".to_string(),
            Command::PONG(..) => "PONG".to_string(),
            Command::ERROR(_) => "ERROR".to_string(),
            Command::Response(resp, _) => format!("{:03}", resp.code()),
            Command::Raw(cmd, _) => cmd.clone(),
        }
    }
}

/// Write a parameter list, prefixing the final parameter with `:` when it
/// needs trailing encoding (spaces, emptiness, or a leading colon).
fn write_params(f: &mut fmt::Formatter<'_>, params: &[&str]) -> fmt::Result {
    if let Some((last, rest)) = params.split_last() {
        for param in rest {
            write!(f, " {}", param)?;
        }
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            write!(f, " :{}", last)?;
        } else {
            write!(f, " {}", last)?;
        }
    }
    Ok(())
}

/// Write a trailing parameter that is always `:`-prefixed (free-text fields).
fn write_trailing(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    write!(f, " :{}", text)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PASS(pass) => {
                write!(f, "PASS")?;
                write_params(f, &[pass.as_str()])
            }
            Command::NICK(nick) => {
                write!(f, "NICK")?;
                write_params(f, &[nick.as_str()])
            }
            Command::USER(user, mode, realname) => {
                write!(f, "USER {} {} *", user, mode)?;
                write_trailing(f, realname)
            }
            Command::QUIT(None) => write!(f, "QUIT"),
            Command::QUIT(Some(msg)) => {
                write!(f, "QUIT")?;
                write_trailing(f, msg)
            }
            Command::JOIN(chans, None) => {
                write!(f, "JOIN")?;
                write_params(f, &[chans.as_str()])
            }
            Command::JOIN(chans, Some(keys)) => {
                write!(f, "JOIN")?;
                write_params(f, &[chans.as_str(), keys.as_str()])
            }
            Command::PRIVMSG(target, text) => {
                write!(f, "PRIVMSG {}", target)?;
                write_trailing(f, text)
            }
            Command::NOTICE(target, text) => {
                write!(f, "NOTICE {}", target)?;
                write_trailing(f, text)
            }
            Command::PING(s1, None) => {
                write!(f, "PING")?;
                write_trailing(f, s1)
            }
            Command::PING(s1, Some(s2)) => {
                write!(f, "PING {}", s1)?;
                write_trailing(f, s2)
            }
            Command::PONG(s1, None) => {
                write!(f, "PONG")?;
                write_trailing(f, s1)
            }
            Command::PONG(s1, Some(s2)) => {
                write!(f, "PONG {}", s1)?;
                write_trailing(f, s2)
            }
            Command::ERROR(msg) => {
                write!(f, "ERROR")?;
                write_trailing(f, msg)
            }
            Command::Response(resp, args) => {
                write!(f, "{:03}", resp.code())?;
                let refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
                write_params(f, &refs)
            }
            Command::Raw(cmd, args) => {
                write!(f, "{}", cmd)?;
                let refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
                write_params(f, &refs)
            }
        }
    }
}
