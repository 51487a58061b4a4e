//! Outbound suppression for commands typed on this node.
//!
//! Every proxy on the mesh sees every broadcast. If a node transmitted its own
//! broadcast command, each peer that answers broadcasts would answer too and their
//! replies would trigger further answers. Commands meant for this node are therefore
//! executed locally and never put on air; only commands that name another node as
//! target are transmitted.
use super::target::extract_from_message;
use super::normalize::is_command;

/// Destinations that address everyone.
pub fn is_broadcast(dst: &str) -> bool {
    let dst = dst.trim();
    dst.is_empty() || dst == "*" || dst.eq_ignore_ascii_case("ALL")
}

/// True when a locally authored frame must stay local instead of being transmitted.
pub fn should_suppress(src: &str, dst: &str, msg: &str, my_callsign: &str) -> bool {
    if !src.eq_ignore_ascii_case(my_callsign) {
        return false;
    }
    if !is_command(msg) {
        return false;
    }
    if is_broadcast(dst) {
        return true;
    }
    match extract_from_message(&msg.to_uppercase()) {
        None => true,
        Some(target) => target.eq_ignore_ascii_case(my_callsign),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: &str = "DK5EN-99";

    #[test]
    fn own_broadcast_command_is_suppressed() {
        assert!(should_suppress(ME, "*", "!WX", ME));
        assert!(should_suppress(ME, "ALL", "!time", ME));
        assert!(should_suppress(ME, "", "!dice", ME));
        // Broadcast stays local even when it names another target.
        assert!(should_suppress(ME, "*", "!WX TARGET:DB0ED-99", ME));
    }

    #[test]
    fn command_targeting_another_node_is_sent() {
        assert!(!should_suppress(ME, "DB0ED-99", "!WX TARGET:DB0ED-99", ME));
        assert!(!should_suppress(ME, "20", "!mheard DB0ED-99", ME));
    }

    #[test]
    fn local_intent_is_suppressed() {
        assert!(should_suppress(ME, "DB0ED-99", "!WX", ME));
        assert!(should_suppress(ME, "20", "!WX TARGET:LOCAL", ME));
        assert!(should_suppress(ME, "20", "!WX TARGET:DK5EN-99", ME));
    }

    #[test]
    fn foreign_and_chat_frames_pass() {
        assert!(!should_suppress("DL1XYZ", "DB0ED-99", "!WX", ME));
        assert!(!should_suppress(ME, "*", "Hello mesh", ME));
    }
}
