//! Invite selection heuristic

use crate::models::Invitation;

/// Channel name preferred when picking an invite
pub const PREFERRED_CHANNEL: &str = "general";

/// Pick the invite to store for a server
///
/// The first invitation is the fallback whatever its state. Among the
/// permanent, non-revoked ones, an invite issued for the `general` channel
/// replaces it, and a later `general` invite wins over an earlier one.
pub fn select_best_invite(invites: &[Invitation]) -> Option<&Invitation> {
    let mut best: Option<&Invitation> = None;

    for invite in invites {
        if best.is_none() {
            best = Some(invite);
        }
        if invite.is_degraded() {
            continue;
        }
        if invite.channel.name == PREFERRED_CHANNEL {
            best = Some(invite);
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(code: &str, channel: &str) -> Invitation {
        Invitation::new(code, format!("{code}-channel"), channel)
    }

    #[test]
    fn test_empty_yields_none() {
        assert!(select_best_invite(&[]).is_none());
    }

    #[test]
    fn test_falls_back_to_first_without_general() {
        let invites = vec![
            invite("a", "lobby").temporary(),
            invite("b", "general").revoked(),
            invite("c", "rules").temporary(),
        ];
        assert_eq!(select_best_invite(&invites).unwrap().code, "a");
    }

    #[test]
    fn test_single_general_selected() {
        let invites = vec![
            invite("a", "lobby"),
            invite("b", "general"),
            invite("c", "rules"),
        ];
        assert_eq!(select_best_invite(&invites).unwrap().code, "b");
    }

    #[test]
    fn test_last_general_wins() {
        let invites = vec![
            invite("a", "general"),
            invite("b", "lobby"),
            invite("c", "general"),
            invite("d", "general").revoked(),
        ];
        assert_eq!(select_best_invite(&invites).unwrap().code, "c");
    }

    #[test]
    fn test_channel_name_match_is_exact() {
        let invites = vec![invite("a", "lobby"), invite("b", "General")];
        assert_eq!(select_best_invite(&invites).unwrap().code, "a");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_invite() -> impl Strategy<Value = Invitation> {
            (
                "[a-z0-9]{4,8}",
                prop_oneof![Just("general"), Just("lobby"), Just("rules")],
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(code, channel, temporary, revoked)| {
                    let mut invite = Invitation::new(code, "1", channel);
                    invite.temporary = temporary;
                    invite.revoked = revoked;
                    invite
                })
        }

        proptest! {
            #[test]
            fn selection_is_member_of_input(invites in prop::collection::vec(arb_invite(), 0..12)) {
                match select_best_invite(&invites) {
                    None => prop_assert!(invites.is_empty()),
                    Some(best) => prop_assert!(invites.iter().any(|i| std::ptr::eq(i, best))),
                }
            }

            #[test]
            fn selection_is_last_usable_general_or_first(
                invites in prop::collection::vec(arb_invite(), 1..12)
            ) {
                let expected = invites
                    .iter()
                    .rev()
                    .find(|i| !i.is_degraded() && i.channel.name == PREFERRED_CHANNEL)
                    .unwrap_or(&invites[0]);

                let best = select_best_invite(&invites).unwrap();
                prop_assert!(std::ptr::eq(best, expected));
            }
        }
    }
}
