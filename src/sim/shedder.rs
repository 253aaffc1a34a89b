//! Priority- and fairness-based load-shedding decision.
//!
//! Every outlet runs this independently on the same (eventually consistent)
//! inputs. Priorities are ordered so that a numerically lower priority is
//! less important and is shed first. Within one priority tier the fairness
//! rule is *smallest first*: outlets with a lower forecast are shed before
//! more expensive ones, so each outlet can tell from the peer table alone
//! whether cutting the cheaper members of its tier already closes the gap.
//! Equal forecasts are ordered by outlet id, lowest first, so a tied tier
//! never sheds all of its members at once.
//!
//! Within a tier the checks run in this order: if shedding the entire tier
//! still leaves the deficit at or above the budget the outlet switches off;
//! otherwise it stays on when its cheaper tier peers cover the deficit, and
//! dims or switches off when they do not.

use std::fmt;

use serde::Serialize;

use super::peers::PeerTable;

/// What the outlet should do for the coming cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", content = "level", rename_all = "snake_case")]
pub enum ShedAction {
    /// Full power.
    On,
    /// Relay open.
    Off,
    /// Powered at the given fraction, strictly between 0 and 1.
    Dim(f32),
}

impl ShedAction {
    /// Output fraction in `[0, 1]` implied by the action.
    pub fn level(self) -> f32 {
        match self {
            ShedAction::On => 1.0,
            ShedAction::Off => 0.0,
            ShedAction::Dim(level) => level,
        }
    }
}

impl fmt::Display for ShedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShedAction::On => f.write_str("on"),
            ShedAction::Off => f.write_str("off"),
            ShedAction::Dim(level) => write!(f, "dim({:.0}%)", level * 100.0),
        }
    }
}

/// Which branch of the policy produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShedReason {
    /// Outside a sheddable window.
    Protected,
    /// Shedding strictly lower tiers is enough.
    LowerTiersSuffice,
    /// Only outlet in its tier; must give up power.
    SoleInTier,
    /// Shedding the cheaper outlets of the same tier is enough.
    CheaperPeersSuffice,
    /// This outlet is among the cheapest the tier has to give up.
    ShedInTier,
    /// Even shedding the whole tier cannot meet the budget.
    TierExhausted,
}

/// Inputs to one decision.
#[derive(Debug, Clone, Copy)]
pub struct ShedInput<'a> {
    /// This outlet's forecast to month end (kWh).
    pub self_forecast_kwh: f32,
    /// Own forecast plus every known peer forecast (kWh).
    pub aggregate_forecast_kwh: f32,
    /// Monthly cap minus consumption so far (kWh).
    pub budget_remaining_kwh: f32,
    /// This outlet's priority for the current quarter.
    pub priority: i32,
    /// Whether this outlet may be shed in the current quarter.
    pub can_shed_now: bool,
    /// Whether the outlet has a dimmer.
    pub dimmable: bool,
    pub peers: &'a PeerTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShedDecision {
    pub action: ShedAction,
    pub reason: ShedReason,
    /// Aggregate forecast minus what strictly lower, sheddable tiers can give up.
    pub deficit_kwh: f32,
}

/// Stateless decision policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadShedder;

impl LoadShedder {
    /// Computes the action for the coming cycle.
    pub fn decide(&self, input: &ShedInput<'_>) -> ShedDecision {
        let budget = input.budget_remaining_kwh.max(0.0);
        let own = input.self_forecast_kwh.max(0.0);

        if !input.can_shed_now {
            return ShedDecision {
                action: ShedAction::On,
                reason: ShedReason::Protected,
                deficit_kwh: input.aggregate_forecast_kwh,
            };
        }

        let mut lower_tiers = 0.0_f32;
        input.peers.for_each_below_priority(input.priority, |_, peer| {
            if peer.can_shed {
                lower_tiers += peer.forecast_kwh;
            }
        });
        let deficit = input.aggregate_forecast_kwh - lower_tiers;

        let decision = |action, reason| ShedDecision {
            action,
            reason,
            deficit_kwh: deficit,
        };

        if deficit <= budget {
            return decision(ShedAction::On, ShedReason::LowerTiersSuffice);
        }

        let mut tier_peers = 0_usize;
        let mut tier_total = own;
        let mut cheaper_total = 0.0_f32;
        let local = input.peers.local();
        input.peers.for_each_at_priority(input.priority, |id, peer| {
            if peer.can_shed {
                tier_peers += 1;
                tier_total += peer.forecast_kwh;
                if peer.forecast_kwh < own || (peer.forecast_kwh == own && id < local) {
                    cheaper_total += peer.forecast_kwh;
                }
            }
        });

        if tier_peers == 0 {
            let residual = deficit - own;
            let action = if input.dimmable && residual < budget {
                dim_to(budget - residual, own)
            } else {
                ShedAction::Off
            };
            return decision(action, ShedReason::SoleInTier);
        }

        if deficit - tier_total >= budget {
            // Nothing this tier does is enough; higher tiers will shed as well.
            return decision(ShedAction::Off, ShedReason::TierExhausted);
        }

        if deficit - cheaper_total <= budget {
            return decision(ShedAction::On, ShedReason::CheaperPeersSuffice);
        }

        let residual = deficit - cheaper_total - own;
        let action = if input.dimmable && residual <= budget {
            dim_to(budget - residual, own)
        } else {
            ShedAction::Off
        };
        decision(action, ShedReason::ShedInTier)
    }
}

/// Dim level that spends exactly `headroom` of a forecast of `own`.
///
/// A zero forecast or a level that rounds to nothing resolves to `Off`; a
/// level of one or more is full power.
fn dim_to(headroom: f32, own: f32) -> ShedAction {
    if own <= 0.0 || !own.is_finite() {
        return ShedAction::Off;
    }
    let level = headroom / own;
    if !level.is_finite() || level <= 0.0 {
        ShedAction::Off
    } else if level >= 1.0 {
        ShedAction::On
    } else {
        ShedAction::Dim(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::snapshot::{NodeId, Snapshot};

    const SELF_ID: NodeId = NodeId(1);

    fn table(peers: &[(u16, f32, i32, bool)]) -> PeerTable {
        let mut table = PeerTable::new(SELF_ID);
        for &(id, forecast, priority, can_shed) in peers {
            table.upsert(
                &Snapshot {
                    sender: NodeId(id),
                    forecast_kwh: forecast,
                    last_interval_kwh: 0.0,
                    priority,
                    can_shed,
                    command: None,
                },
                0,
            );
        }
        table
    }

    fn input(
        peers: &PeerTable,
        own: f32,
        aggregate: f32,
        budget: f32,
        dimmable: bool,
    ) -> ShedInput<'_> {
        ShedInput {
            self_forecast_kwh: own,
            aggregate_forecast_kwh: aggregate,
            budget_remaining_kwh: budget,
            priority: 5,
            can_shed_now: true,
            dimmable,
            peers,
        }
    }

    #[test]
    fn single_node_within_budget_stays_on() {
        let peers = table(&[]);
        let d = LoadShedder.decide(&input(&peers, 100.0, 100.0, 200.0, false));
        assert_eq!(d.action, ShedAction::On);
        assert_eq!(d.reason, ShedReason::LowerTiersSuffice);
    }

    #[test]
    fn sole_candidate_over_budget_switches_off() {
        let peers = table(&[]);
        let d = LoadShedder.decide(&input(&peers, 50.0, 150.0, 100.0, false));
        assert_eq!(d.action, ShedAction::Off);
        assert_eq!(d.reason, ShedReason::SoleInTier);
    }

    #[test]
    fn zero_dim_boundary_resolves_to_off() {
        // (100 - (150 - 50)) / 50 == 0
        let peers = table(&[]);
        let d = LoadShedder.decide(&input(&peers, 50.0, 150.0, 100.0, true));
        assert_eq!(d.action, ShedAction::Off);
    }

    #[test]
    fn sole_dimmable_candidate_dims_to_fit() {
        let peers = table(&[]);
        let d = LoadShedder.decide(&input(&peers, 50.0, 120.0, 100.0, true));
        // (100 - 70) / 50
        assert_eq!(d.action, ShedAction::Dim(0.6));
    }

    #[test]
    fn zero_self_forecast_never_dims() {
        let peers = table(&[]);
        let d = LoadShedder.decide(&input(&peers, 0.0, 150.0, 100.0, true));
        assert_eq!(d.action, ShedAction::Off);
    }

    #[test]
    fn protected_window_keeps_power_on() {
        let peers = table(&[]);
        let mut i = input(&peers, 500.0, 5000.0, 10.0, false);
        i.can_shed_now = false;
        let d = LoadShedder.decide(&i);
        assert_eq!(d.action, ShedAction::On);
        assert_eq!(d.reason, ShedReason::Protected);
    }

    #[test]
    fn lower_priority_peers_absorb_the_deficit() {
        let peers = table(&[(2, 80.0, 1, true), (3, 50.0, 9, true)]);
        // aggregate 230, minus 80 from the lower tier = 150 <= 160
        let d = LoadShedder.decide(&input(&peers, 100.0, 230.0, 160.0, false));
        assert_eq!(d.action, ShedAction::On);
        assert_eq!(d.deficit_kwh, 150.0);
    }

    #[test]
    fn protected_lower_peers_do_not_count() {
        let peers = table(&[(2, 80.0, 1, false)]);
        let d = LoadShedder.decide(&input(&peers, 100.0, 180.0, 120.0, false));
        assert_eq!(d.deficit_kwh, 180.0);
        assert_eq!(d.action, ShedAction::Off);
    }

    #[test]
    fn cheaper_member_of_a_pair_is_shed() {
        // self 40, peer 60, deficit 120, budget 90: 120 - 40 = 80 <= 90
        let peers = table(&[(2, 60.0, 5, true)]);
        let mine = LoadShedder.decide(&input(&peers, 40.0, 120.0, 90.0, false));
        assert_eq!(mine.action, ShedAction::Off);
        assert_eq!(mine.reason, ShedReason::ShedInTier);

        // The same situation seen from the more expensive peer.
        let mut theirs_table = PeerTable::new(NodeId(2));
        theirs_table.upsert(
            &Snapshot {
                sender: SELF_ID,
                forecast_kwh: 40.0,
                last_interval_kwh: 0.0,
                priority: 5,
                can_shed: true,
                command: None,
            },
            0,
        );
        let theirs = LoadShedder.decide(&input(&theirs_table, 60.0, 120.0, 90.0, false));
        assert_eq!(theirs.action, ShedAction::On);
        assert_eq!(theirs.reason, ShedReason::CheaperPeersSuffice);
    }

    #[test]
    fn tied_members_shed_in_id_order() {
        // Equal forecasts of 50, deficit 130, budget 90: one member suffices.
        let peers = table(&[(2, 50.0, 5, true)]);
        let lower_id = LoadShedder.decide(&input(&peers, 50.0, 130.0, 90.0, false));
        assert_eq!(lower_id.action, ShedAction::Off);
        assert_eq!(lower_id.reason, ShedReason::ShedInTier);

        let mut higher_table = PeerTable::new(NodeId(2));
        higher_table.upsert(
            &Snapshot {
                sender: SELF_ID,
                forecast_kwh: 50.0,
                last_interval_kwh: 0.0,
                priority: 5,
                can_shed: true,
                command: None,
            },
            0,
        );
        let higher_id = LoadShedder.decide(&input(&higher_table, 50.0, 130.0, 90.0, false));
        assert_eq!(higher_id.action, ShedAction::On);
        assert_eq!(higher_id.reason, ShedReason::CheaperPeersSuffice);
    }

    #[test]
    fn cheaper_member_dims_when_partial_relief_suffices() {
        let peers = table(&[(2, 60.0, 5, true)]);
        let d = LoadShedder.decide(&input(&peers, 40.0, 120.0, 90.0, true));
        // (90 - (120 - 0 - 40)) / 40
        assert_eq!(d.action, ShedAction::Dim(0.25));
    }

    #[test]
    fn exhausted_tier_sheds_fully() {
        let peers = table(&[(2, 10.0, 5, true)]);
        // deficit 500 - tier 30 = 470 >= 100
        let d = LoadShedder.decide(&input(&peers, 20.0, 500.0, 100.0, true));
        assert_eq!(d.action, ShedAction::Off);
        assert_eq!(d.reason, ShedReason::TierExhausted);
    }

    #[test]
    fn dim_level_is_clamped() {
        assert_eq!(dim_to(10.0, 0.0), ShedAction::Off);
        assert_eq!(dim_to(-5.0, 10.0), ShedAction::Off);
        assert_eq!(dim_to(30.0, 10.0), ShedAction::On);
        assert_eq!(dim_to(5.0, 10.0), ShedAction::Dim(0.5));
    }
}
