//! Execution decision for inbound commands.
//!
//! Each proxy decides on its own, from the frame alone, whether it is the node that
//! answers. The table (src = us/other, dst = broadcast/us/group, target = none/us/other):
//!
//! | src   | dst       | target              | execute | mode   | reply to |
//! |-------|-----------|---------------------|---------|--------|----------|
//! | us    | broadcast | any                 | yes     | group  | dst      |
//! | other | broadcast | any                 | no      |        |          |
//! | us    | any       | none / us           | yes     | by dst | dst      |
//! | us    | any       | other               | no      |        |          |
//! | other | us        | none / us           | yes     | direct | src      |
//! | other | us        | other               | no      |        |          |
//! | other | group     | us, permitted       | yes     | group  | dst      |
//! | other | group     | otherwise           | no      |        |          |
//!
//! "Permitted" means group responses are enabled or the sender is the admin.
use super::suppress::is_broadcast;
use crate::validation::{base_callsign, is_group};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Direct,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub execute: bool,
    pub reply_to: String,
    pub mode: Option<ReplyMode>,
}

impl Decision {
    fn run(reply_to: &str, mode: ReplyMode) -> Self {
        Self {
            execute: true,
            reply_to: reply_to.to_string(),
            mode: Some(mode),
        }
    }

    fn skip() -> Self {
        Self {
            execute: false,
            reply_to: String::new(),
            mode: None,
        }
    }
}

/// Admin check on the base callsign, ignoring SSID and case.
pub fn is_admin(src: &str, admin_base: &str) -> bool {
    let admin = base_callsign(admin_base);
    !admin.is_empty() && base_callsign(src) == admin
}

fn mode_for(dst: &str) -> ReplyMode {
    if is_broadcast(dst) || is_group(dst) {
        ReplyMode::Group
    } else {
        ReplyMode::Direct
    }
}

pub fn decide(
    src: &str,
    dst: &str,
    cmd_target: Option<&str>,
    my_callsign: &str,
    groups_enabled: bool,
    is_admin: bool,
) -> Decision {
    let from_us = src.eq_ignore_ascii_case(my_callsign);
    let target_is_us = cmd_target
        .map(|t| t.eq_ignore_ascii_case(my_callsign))
        .unwrap_or(false);

    if is_broadcast(dst) {
        return if from_us {
            Decision::run(dst, ReplyMode::Group)
        } else {
            Decision::skip()
        };
    }

    if from_us {
        return match cmd_target {
            None => Decision::run(dst, mode_for(dst)),
            Some(_) if target_is_us => Decision::run(dst, mode_for(dst)),
            Some(_) => Decision::skip(),
        };
    }

    if dst.eq_ignore_ascii_case(my_callsign) {
        return match cmd_target {
            None => Decision::run(src, ReplyMode::Direct),
            Some(_) if target_is_us => Decision::run(src, ReplyMode::Direct),
            Some(_) => Decision::skip(),
        };
    }

    if is_group(dst) && target_is_us && (groups_enabled || is_admin) {
        return Decision::run(dst, ReplyMode::Group);
    }

    Decision::skip()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "DB0ED-99";
    const OTHER: &str = "DL1XYZ-7";

    #[test]
    fn own_broadcast_executes_to_group() {
        let d = decide(ME, "*", None, ME, false, false);
        assert!(d.execute);
        assert_eq!(d.reply_to, "*");
        assert_eq!(d.mode, Some(ReplyMode::Group));
        assert!(decide(ME, "", Some(OTHER), ME, false, false).execute);
    }

    #[test]
    fn foreign_broadcast_never_executes() {
        assert!(!decide(OTHER, "*", None, ME, true, true).execute);
        assert!(!decide(OTHER, "", Some(ME), ME, true, true).execute);
    }

    #[test]
    fn own_command_to_any_destination() {
        let d = decide(ME, "20", None, ME, false, false);
        assert!(d.execute);
        assert_eq!(d.reply_to, "20");
        assert_eq!(d.mode, Some(ReplyMode::Group));

        let d = decide(ME, "DK5EN-1", Some(ME), ME, false, false);
        assert!(d.execute);
        assert_eq!(d.reply_to, "DK5EN-1");
        assert_eq!(d.mode, Some(ReplyMode::Direct));

        assert!(!decide(ME, "20", Some(OTHER), ME, false, false).execute);
    }

    #[test]
    fn direct_to_us() {
        let d = decide(OTHER, ME, None, ME, false, false);
        assert!(d.execute);
        assert_eq!(d.reply_to, OTHER);
        assert_eq!(d.mode, Some(ReplyMode::Direct));

        assert!(decide(OTHER, ME, Some(ME), ME, false, false).execute);
        assert!(!decide(OTHER, ME, Some("OE1ABC-1"), ME, false, false).execute);
    }

    #[test]
    fn group_requires_permission_and_target() {
        assert!(!decide(OTHER, "20", Some(ME), ME, false, false).execute);
        let admin = decide(OTHER, "20", Some(ME), ME, false, true);
        assert!(admin.execute);
        assert_eq!(admin.reply_to, "20");
        assert_eq!(admin.mode, Some(ReplyMode::Group));
        assert!(decide(OTHER, "20", Some(ME), ME, true, false).execute);
        assert!(!decide(OTHER, "20", None, ME, true, true).execute);
        assert!(!decide(OTHER, "20", Some("OE1ABC-1"), ME, true, true).execute);
    }

    #[test]
    fn unrelated_direct_is_ignored() {
        assert!(!decide(OTHER, "OE1ABC-1", None, ME, true, true).execute);
    }

    #[test]
    fn admin_compares_base_callsign() {
        assert!(is_admin("dk5en-12", "DK5EN"));
        assert!(is_admin("DK5EN", "dk5en-1"));
        assert!(!is_admin("DK5ENX-1", "DK5EN"));
        assert!(!is_admin("DK5EN-1", ""));
    }
}
