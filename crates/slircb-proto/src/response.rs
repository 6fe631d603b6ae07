//! IRC numeric response codes.
//!
//! The subset of server numerics a bouncer issues toward its downstream
//! clients, plus the upstream numerics it reacts to during registration.
//!
//! # Reference
//! - RFC 2812: Internet Relay Chat: Client Protocol
//! - Modern IRC documentation: <https://modern.ircdocs.horse/>

#![allow(non_camel_case_types)]

use crate::command::Command;
use crate::message::Message;

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    // === Connection Registration (001-099) ===
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 002 - Your host is running version
    RPL_YOURHOST = 2,
    /// 003 - Server creation date
    RPL_CREATED = 3,
    /// 004 - Server info (name, version, user modes, channel modes)
    RPL_MYINFO = 4,
    /// 005 - Server supported features (ISUPPORT)
    RPL_ISUPPORT = 5,

    // === Error Replies (400-599) ===
    /// 421 - Unknown command
    ERR_UNKNOWNCOMMAND = 421,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
    /// 451 - You have not registered
    ERR_NOTREGISTERED = 451,
    /// 461 - Not enough parameters
    ERR_NEEDMOREPARAMS = 461,
    /// 462 - You may not reregister
    ERR_ALREADYREGISTRED = 462,
    /// 464 - Password incorrect
    ERR_PASSWDMISMATCH = 464,
}

impl Response {
    /// Numeric code for this response.
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Map a numeric code back to a known response, if any.
    pub fn from_code(code: u16) -> Option<Response> {
        match code {
            1 => Some(Response::RPL_WELCOME),
            2 => Some(Response::RPL_YOURHOST),
            3 => Some(Response::RPL_CREATED),
            4 => Some(Response::RPL_MYINFO),
            5 => Some(Response::RPL_ISUPPORT),
            421 => Some(Response::ERR_UNKNOWNCOMMAND),
            432 => Some(Response::ERR_ERRONEUSNICKNAME),
            433 => Some(Response::ERR_NICKNAMEINUSE),
            451 => Some(Response::ERR_NOTREGISTERED),
            461 => Some(Response::ERR_NEEDMOREPARAMS),
            462 => Some(Response::ERR_ALREADYREGISTRED),
            464 => Some(Response::ERR_PASSWDMISMATCH),
            _ => None,
        }
    }

    /// Whether this numeric is an error reply (400-599 range).
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code())
    }

    fn reply(self, args: Vec<String>) -> Message {
        Message {
            tags: None,
            prefix: None,
            command: Command::Response(self, args),
        }
    }

    /// Build a 432 reply referencing the rejected nickname.
    pub fn err_erroneusnickname(nick: &str, bad_nick: &str) -> Message {
        Response::ERR_ERRONEUSNICKNAME.reply(vec![
            nick.to_string(),
            bad_nick.to_string(),
            "Erroneous nickname".to_string(),
        ])
    }

    /// Build a 461 reply for a command missing parameters.
    pub fn err_needmoreparams(nick: &str, command: &str) -> Message {
        Response::ERR_NEEDMOREPARAMS.reply(vec![
            nick.to_string(),
            command.to_string(),
            "Not enough parameters".to_string(),
        ])
    }

    /// Build a 451 reply.
    pub fn err_notregistered(nick: &str) -> Message {
        Response::ERR_NOTREGISTERED.reply(vec![
            nick.to_string(),
            "You have not registered".to_string(),
        ])
    }

    /// Build a 462 reply.
    pub fn err_alreadyregistred(nick: &str) -> Message {
        Response::ERR_ALREADYREGISTRED.reply(vec![
            nick.to_string(),
            "You may not reregister".to_string(),
        ])
    }

    /// Build a 464 reply.
    pub fn err_passwdmismatch(nick: &str) -> Message {
        Response::ERR_PASSWDMISMATCH.reply(vec![
            nick.to_string(),
            "Password incorrect".to_string(),
        ])
    }
}
