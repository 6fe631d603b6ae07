//! The per-client registration state machine.
//!
//! A session is unregistered until both the NICK and USER locks are set.
//! PASS is recorded but never gates completion; its password component is
//! kept for the deferred credential-verification step and only its optional
//! `user[/network]` head participates in identity resolution.

use slircb_proto::clean_name;

use crate::error::ClientError;

/// Registration locks and captured handshake fields for one session.
#[derive(Debug, Default)]
pub struct Registration {
    /// Negotiated nickname, set by an accepted NICK.
    pub nick: Option<String>,
    /// Username from USER, not content-validated at this layer.
    pub username: Option<String>,
    /// Realname from USER.
    pub realname: Option<String>,
    /// Raw PASS value, recorded verbatim.
    pub pass: Option<String>,
    nick_lock: bool,
    user_lock: bool,
}

/// Who a completing session claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Bouncer user id to resolve against the registry.
    pub user: String,
    /// Network the session asked for, if any.
    pub network: Option<String>,
}

impl Registration {
    /// Handle NICK: validate the candidate, store it, set the lock.
    ///
    /// On rejection the lock stays unset and the session state is unchanged;
    /// the caller reports the erroneous-nickname reply.
    pub fn handle_nick(&mut self, candidate: &str) -> Result<(), ClientError> {
        let nick = clean_name(candidate)
            .map_err(|_| ClientError::ErroneousNickname(candidate.to_string()))?;
        self.nick = Some(nick);
        self.nick_lock = true;
        Ok(())
    }

    /// Handle USER: record the fields and set the lock. Repeats are ignored.
    pub fn handle_user(&mut self, username: &str, realname: &str) {
        if self.user_lock {
            return;
        }
        self.username = Some(username.to_string());
        self.realname = Some(realname.to_string());
        self.user_lock = true;
    }

    /// Handle PASS: record the value. No state change.
    pub fn handle_pass(&mut self, value: &str) {
        self.pass = Some(value.to_string());
    }

    pub fn nick_lock(&self) -> bool {
        self.nick_lock
    }

    pub fn user_lock(&self) -> bool {
        self.user_lock
    }

    /// Both locks set: the session may complete registration.
    pub fn ready(&self) -> bool {
        self.nick_lock && self.user_lock
    }

    /// Resolve the claimed identity.
    ///
    /// A PASS of the form `user[/network]:password` names the identity
    /// directly; otherwise the USER-command username is used, which may
    /// itself carry a `/network` suffix.
    pub fn identity(&self) -> Option<Identity> {
        let raw = match &self.pass {
            Some(pass) if pass.contains(':') => pass.split(':').next().unwrap_or(pass),
            _ => self.username.as_deref()?,
        };

        let (user, network) = match raw.split_once('/') {
            Some((user, network)) => (user, Some(network.to_string())),
            None => (raw, None),
        };
        if user.is_empty() {
            return None;
        }

        Some(Identity {
            user: user.to_string(),
            network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_nick_sets_lock_once() {
        let mut reg = Registration::default();
        assert!(reg.handle_nick("gooduser").is_ok());
        assert!(reg.nick_lock());
        assert_eq!(reg.nick.as_deref(), Some("gooduser"));
    }

    #[test]
    fn rejected_nicks_leave_lock_unset() {
        for bad in ["bad nick", "9lives", "", "   ", "with,comma", "at@sign"] {
            let mut reg = Registration::default();
            let err = reg.handle_nick(bad).unwrap_err();
            assert!(
                matches!(err, ClientError::ErroneousNickname(ref input) if input == bad),
                "unexpected error for {:?}: {:?}",
                bad,
                err
            );
            assert!(!reg.nick_lock());
            assert!(reg.nick.is_none());
        }
    }

    #[test]
    fn embedded_space_rejection_references_input() {
        let mut reg = Registration::default();
        let err = reg.handle_nick("bad nick").unwrap_err();
        match err {
            ClientError::ErroneousNickname(input) => assert_eq!(input, "bad nick"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!reg.nick_lock());
    }

    #[test]
    fn ready_requires_both_locks() {
        let mut reg = Registration::default();
        assert!(!reg.ready());

        reg.handle_nick("gooduser").unwrap();
        assert!(!reg.ready());

        reg.handle_user("ignored", "Real Name");
        assert!(reg.ready());
    }

    #[test]
    fn pass_never_gates_completion() {
        // Without PASS:
        let mut reg = Registration::default();
        reg.handle_nick("gooduser").unwrap();
        reg.handle_user("daniel", "Real Name");
        assert!(reg.ready());

        // With PASS, before or after the others, identical result:
        let mut reg = Registration::default();
        reg.handle_pass("secret");
        assert!(!reg.ready());
        reg.handle_nick("gooduser").unwrap();
        reg.handle_user("daniel", "Real Name");
        assert!(reg.ready());
    }

    #[test]
    fn pass_alone_changes_no_locks() {
        let mut reg = Registration::default();
        reg.handle_pass("secret");
        assert!(!reg.nick_lock());
        assert!(!reg.user_lock());
        assert_eq!(reg.pass.as_deref(), Some("secret"));
    }

    #[test]
    fn repeated_user_is_ignored() {
        let mut reg = Registration::default();
        reg.handle_user("first", "First Name");
        reg.handle_user("second", "Second Name");
        assert_eq!(reg.username.as_deref(), Some("first"));
    }

    #[test]
    fn identity_from_username() {
        let mut reg = Registration::default();
        reg.handle_nick("gooduser").unwrap();
        reg.handle_user("daniel", "Real Name");
        assert_eq!(
            reg.identity(),
            Some(Identity {
                user: "daniel".to_string(),
                network: None,
            })
        );
    }

    #[test]
    fn identity_with_network_suffix() {
        let mut reg = Registration::default();
        reg.handle_user("daniel/exampleNet", "Real Name");
        assert_eq!(
            reg.identity(),
            Some(Identity {
                user: "daniel".to_string(),
                network: Some("exampleNet".to_string()),
            })
        );
    }

    #[test]
    fn identity_from_pass_takes_precedence() {
        let mut reg = Registration::default();
        reg.handle_pass("daniel/exampleNet:hunter2");
        reg.handle_user("ignored", "Real Name");
        assert_eq!(
            reg.identity(),
            Some(Identity {
                user: "daniel".to_string(),
                network: Some("exampleNet".to_string()),
            })
        );
    }

    #[test]
    fn bare_pass_is_not_an_identity() {
        // No colon: the whole value is a password, identity falls back to
        // the USER username.
        let mut reg = Registration::default();
        reg.handle_pass("hunter2");
        reg.handle_user("daniel", "Real Name");
        assert_eq!(
            reg.identity(),
            Some(Identity {
                user: "daniel".to_string(),
                network: None,
            })
        );
    }
}
