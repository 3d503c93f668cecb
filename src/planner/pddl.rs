//! PDDL encoding of the shopping problem and decoding of planner output.
//!
//! Rendering is a pure function of the [`ProblemSnapshot`]: cells appear in
//! location order and stores in name order, so identical facts always yield
//! byte-identical problem files.

use std::fmt::Write as _;

use crate::facts::{CellStatus, ProblemSnapshot};
use crate::grid::Location;
use crate::plan::PlanAction;

use super::{PlannerError, PlannerResult};

/// Domain name used by [`DOMAIN`] and every rendered problem.
pub const DOMAIN_NAME: &str = "grid-shopping";

/// The planning domain. Drives cost one unit; purchases are free.
pub const DOMAIN: &str = "\
(define (domain grid-shopping)
  (:requirements :strips :typing :action-costs)
  (:types agent location store item)
  (:predicates
    (at_agent ?a - agent ?l - location)
    (at_store ?s - store ?l - location)
    (connected ?from ?to - location)
    (selling ?s - store ?i - item)
    (have ?a - agent ?i - item)
    (blocked ?l - location)
    (clear ?l - location))
  (:functions (total-cost) - number)

  (:action drive
    :parameters (?a - agent ?from ?to - location)
    :precondition (and (at_agent ?a ?from) (connected ?from ?to) (clear ?to))
    :effect (and (not (at_agent ?a ?from)) (at_agent ?a ?to)
                 (increase (total-cost) 1)))

  (:action buy
    :parameters (?a - agent ?i - item ?s - store ?l - location)
    :precondition (and (at_agent ?a ?l) (at_store ?s ?l) (selling ?s ?i))
    :effect (have ?a ?i)))
";

const AGENT: &str = "agent";

/// Render the problem file for `snapshot`.
pub fn render_problem(snapshot: &ProblemSnapshot) -> String {
    let item = &snapshot.item_ident;
    let mut out = String::new();

    let _ = writeln!(out, "(define (problem shopping-r{})", snapshot.revision);
    let _ = writeln!(out, "  (:domain {DOMAIN_NAME})");

    out.push_str("  (:objects\n");
    let _ = writeln!(out, "    {AGENT} - agent");
    for (loc, _) in &snapshot.cells {
        let _ = writeln!(out, "    {} - location", loc.pddl_name());
    }
    for store in &snapshot.stores {
        let _ = writeln!(out, "    {} - store", store.ident);
    }
    let _ = writeln!(out, "    {item} - item)");

    out.push_str("  (:init\n");
    let _ = writeln!(out, "    (at_agent {AGENT} {})", snapshot.agent.pddl_name());
    for (loc, status) in &snapshot.cells {
        // The agent's own cell must be enterable again after a detour.
        let status = if *loc == snapshot.agent {
            CellStatus::Clear
        } else {
            *status
        };
        let pred = match status {
            CellStatus::Clear => "clear",
            CellStatus::Blocked => "blocked",
        };
        let _ = writeln!(out, "    ({pred} {})", loc.pddl_name());
    }
    for (from, to) in snapshot.connections() {
        let _ = writeln!(out, "    (connected {} {})", from.pddl_name(), to.pddl_name());
    }
    for store in &snapshot.stores {
        let _ = writeln!(
            out,
            "    (at_store {} {})",
            store.ident,
            store.location.pddl_name()
        );
        if store.sells_target {
            let _ = writeln!(out, "    (selling {} {item})", store.ident);
        }
    }
    out.push_str("    (= (total-cost) 0))\n");

    let _ = writeln!(out, "  (:goal (have {AGENT} {item}))");
    out.push_str("  (:metric minimize (total-cost)))\n");
    out
}

/// Parse a plan file (`sas_plan` format) into actions.
///
/// Blank lines and `;` comments are skipped. Object names are resolved
/// against the snapshot so the returned actions carry real store names and
/// believed prices.
pub fn parse_plan(text: &str, snapshot: &ProblemSnapshot) -> PlannerResult<Vec<PlanAction>> {
    let mut actions = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        actions.push(parse_action(line, snapshot)?);
    }
    if actions.is_empty() {
        return Err(PlannerError::EmptyPlan);
    }
    Ok(actions)
}

fn parse_action(line: &str, snapshot: &ProblemSnapshot) -> PlannerResult<PlanAction> {
    let err = |message: &str| PlannerError::Parse {
        line: line.to_string(),
        message: message.to_string(),
    };
    let inner = line
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| err("expected a parenthesised action"))?;
    let tokens: Vec<String> = inner
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .collect();
    let location = |name: &str| Location::from_pddl_name(name).ok_or_else(|| err("bad location"));

    match tokens.first().map(String::as_str) {
        // (drive agent from to)
        Some("drive") => match tokens.as_slice() {
            [_, _, from, to] => Ok(PlanAction::Drive {
                from: location(from)?,
                to: location(to)?,
            }),
            _ => Err(err("drive takes an agent and two locations")),
        },
        // (buy agent item store location)
        Some("buy") => match tokens.as_slice() {
            [_, _, _, store, at] => {
                let fact = snapshot
                    .store_by_ident(store)
                    .ok_or_else(|| err("unknown store"))?;
                Ok(PlanAction::Buy {
                    item: snapshot.item.clone(),
                    store: fact.name.clone(),
                    location: location(at)?,
                    price: fact.price,
                })
            }
            _ => Err(err("buy takes an agent, an item, a store and a location")),
        },
        Some(_) => Err(err("unknown action")),
        None => Err(err("empty action")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactStore;
    use crate::grid::Bounds;

    fn facts() -> FactStore {
        let mut facts = FactStore::new(Bounds::new(4, 4), Location::new(1, 1), "Milk");
        facts.mark_store("AM:PM", Location::new(2, 2), true, Some(12.0));
        facts.mark_store("victory", Location::new(2, 1), true, Some(4.0));
        facts.mark_obstacle(Location::new(0, 0));
        facts
    }

    #[test]
    fn problem_rendering_is_deterministic() {
        let a = facts();
        let mut b = FactStore::new(Bounds::new(4, 4), Location::new(1, 1), "Milk");
        b.mark_obstacle(Location::new(0, 0));
        b.mark_store("victory", Location::new(2, 1), true, Some(4.0));
        b.mark_store("AM:PM", Location::new(2, 2), true, Some(12.0));

        let (pa, pb) = (
            render_problem(&a.snapshot_for_planner()),
            render_problem(&b.snapshot_for_planner()),
        );
        assert_eq!(
            pa.lines().skip(1).collect::<Vec<_>>(),
            pb.lines().skip(1).collect::<Vec<_>>()
        );
        assert_eq!(pa, render_problem(&a.snapshot_for_planner()));
    }

    #[test]
    fn problem_contains_the_facts() {
        let problem = render_problem(&facts().snapshot_for_planner());
        assert!(problem.contains("(at_agent agent loc_1_1)"));
        assert!(problem.contains("(blocked loc_0_0)"));
        assert!(problem.contains("(clear loc_2_2)"));
        assert!(problem.contains("(at_store s_am_pm loc_2_2)"));
        assert!(problem.contains("(selling s_am_pm i_milk)"));
        assert!(problem.contains("(connected loc_1_1 loc_2_1)"));
        assert!(problem.contains("(connected loc_2_1 loc_1_1)"));
        assert!(!problem.contains("loc_4_"));
        assert!(problem.contains("(:goal (have agent i_milk))"));
    }

    #[test]
    fn parses_planner_output() {
        let snap = facts().snapshot_for_planner();
        let text = "(drive agent loc_1_1 loc_1_2)\n\
                    (DRIVE AGENT LOC_1_2 LOC_2_2)\n\
                    (buy agent i_milk s_am_pm loc_2_2)\n\
                    ; cost = 2 (general cost)\n";
        let actions = parse_plan(text, &snap).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(
            actions[2],
            PlanAction::Buy {
                item: "Milk".into(),
                store: "AM:PM".into(),
                location: Location::new(2, 2),
                price: Some(12.0),
            }
        );
    }

    #[test]
    fn colliding_store_names_stay_distinct() {
        let mut facts = FactStore::new(Bounds::new(6, 6), Location::new(1, 1), "milk");
        facts.mark_store("AM:PM", Location::new(4, 4), true, Some(12.0));
        facts.mark_store("am_pm", Location::new(2, 1), true, Some(12.0));
        facts.mark_store("agent", Location::new(3, 3), true, Some(5.0));
        let snap = facts.snapshot_for_planner();

        let problem = render_problem(&snap);
        assert_eq!(problem.matches("    s_am_pm - store").count(), 1);
        assert_eq!(problem.matches("    s_am_pm_2 - store").count(), 1);
        assert_eq!(problem.matches(" - agent").count(), 1);
        assert!(problem.contains("(at_store s_am_pm_2 loc_2_1)"));

        let actions = parse_plan(
            "(drive agent loc_1_1 loc_2_1)\n(buy agent i_milk s_am_pm_2 loc_2_1)\n",
            &snap,
        )
        .unwrap();
        assert!(matches!(
            &actions[1],
            PlanAction::Buy { store, location, .. }
                if store == "am_pm" && *location == Location::new(2, 1)
        ));
        crate::planner::validate(&actions, &snap).unwrap();
    }

    #[test]
    fn rejects_garbage() {
        let snap = facts().snapshot_for_planner();
        assert!(matches!(parse_plan("; only a comment\n", &snap), Err(PlannerError::EmptyPlan)));
        assert!(parse_plan("(fly agent loc_1_1 loc_3_3)", &snap).is_err());
        assert!(parse_plan("(buy agent milk tesco loc_2_2)", &snap).is_err());
        assert!(parse_plan("drive agent loc_1_1 loc_1_2", &snap).is_err());
        assert!(parse_plan("(drive agent loc_1_1)", &snap).is_err());
    }
}
