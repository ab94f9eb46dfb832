use crate::backend::Backend;
use crate::errors::{InventoryError, Result};
use crate::model::{CanonicalPath, Direction, EntityKind, WellKnown};

/// Arguments of one rule evaluation
///
/// `direction` is seen from `origin`: `Outgoing` means the relationship goes
/// `origin -> target`, `Incoming` means `target -> origin`.
pub struct RuleContext<'a> {
    pub backend: &'a dyn Backend,
    pub origin: &'a CanonicalPath,
    pub direction: Direction,
    pub name: &'a str,
    pub target: &'a CanonicalPath,
}

impl RuleContext<'_> {
    fn violation(&self, reason: impl Into<String>) -> InventoryError {
        InventoryError::rule_violation(self.name, self.origin, self.target, reason)
    }

    /// (source, target) pairs the relationship could mean in this direction
    fn edges(&self) -> Vec<(&CanonicalPath, &CanonicalPath)> {
        match self.direction {
            Direction::Outgoing => vec![(self.origin, self.target)],
            Direction::Incoming => vec![(self.target, self.origin)],
            Direction::Both => vec![(self.origin, self.target), (self.target, self.origin)],
        }
    }
}

type Check = for<'a> fn(&RuleContext<'a>) -> Result<()>;

const GLOBAL_CREATE: &[Check] = &[non_blank_name];

const CONTAINS_CREATE: &[Check] = &[no_both_direction, no_self_loop, no_loops, no_diamonds];
const IS_PARENT_OF_CREATE: &[Check] = &[no_both_direction, no_self_loop, no_loops];
const IMMUTABLE: &[Check] = &[immutable];
const INCORPORATES_CREATE: &[Check] = &[metadata_pack_protection, single_environment_per_feed];

const CONTAINS_DELETE: &[Check] = &[owned_by_entity_lifecycle];
const IS_PARENT_OF_DELETE: &[Check] = &[not_shadowed_by_contains];
const INCORPORATES_DELETE: &[Check] = &[not_shadowed_by_contains, metadata_pack_protection];

static CREATE_RULES: &[(WellKnown, &[Check])] = &[
    (WellKnown::Contains, CONTAINS_CREATE),
    (WellKnown::IsParentOf, IS_PARENT_OF_CREATE),
    (WellKnown::Defines, IMMUTABLE),
    (WellKnown::HasData, IMMUTABLE),
    (WellKnown::Incorporates, INCORPORATES_CREATE),
];

static DELETE_RULES: &[(WellKnown, &[Check])] = &[
    (WellKnown::Contains, CONTAINS_DELETE),
    (WellKnown::IsParentOf, IS_PARENT_OF_DELETE),
    (WellKnown::Defines, IMMUTABLE),
    (WellKnown::HasData, IMMUTABLE),
    (WellKnown::Incorporates, INCORPORATES_DELETE),
];

fn checks_for(table: &'static [(WellKnown, &'static [Check])], name: &str) -> &'static [Check] {
    WellKnown::from_name(name)
        .and_then(|w| table.iter().find(|(k, _)| *k == w))
        .map(|(_, checks)| *checks)
        .unwrap_or(&[])
}

fn run(checks: &[Check], ctx: &RuleContext<'_>) -> Result<()> {
    for check in checks {
        check(ctx)?;
    }
    Ok(())
}

/// Validate creating relationship `name` between `origin` and `target`
///
/// # Errors
///
/// Returns a validation error describing the first violated rule.
pub fn check_create(
    backend: &dyn Backend,
    origin: &CanonicalPath,
    direction: Direction,
    name: &str,
    target: &CanonicalPath,
) -> Result<()> {
    let ctx = RuleContext {
        backend,
        origin,
        direction,
        name,
        target,
    };
    run(GLOBAL_CREATE, &ctx)?;
    run(checks_for(CREATE_RULES, name), &ctx)
}

/// Validate deleting relationship `name` between `origin` and `target`
///
/// # Errors
///
/// Returns a validation error describing the first violated rule.
pub fn check_delete(
    backend: &dyn Backend,
    origin: &CanonicalPath,
    direction: Direction,
    name: &str,
    target: &CanonicalPath,
) -> Result<()> {
    let ctx = RuleContext {
        backend,
        origin,
        direction,
        name,
        target,
    };
    run(checks_for(DELETE_RULES, name), &ctx)
}

fn non_blank_name(ctx: &RuleContext<'_>) -> Result<()> {
    if ctx.name.trim().is_empty() {
        return Err(ctx.violation("relationship name must not be blank"));
    }
    Ok(())
}

fn no_both_direction(ctx: &RuleContext<'_>) -> Result<()> {
    if ctx.direction == Direction::Both {
        return Err(ctx.violation("direction 'both' is not allowed for this relationship"));
    }
    Ok(())
}

fn no_self_loop(ctx: &RuleContext<'_>) -> Result<()> {
    if ctx.origin == ctx.target {
        return Err(InventoryError::CycleDetected {
            relationship: ctx.name.to_string(),
            source_path: ctx.origin.to_string(),
            target: ctx.target.to_string(),
        });
    }
    Ok(())
}

fn no_loops(ctx: &RuleContext<'_>) -> Result<()> {
    // the new edge closes a cycle iff its target already reaches its source
    let (source, target) = match ctx.direction {
        Direction::Outgoing => (ctx.origin, ctx.target),
        Direction::Incoming => (ctx.target, ctx.origin),
        Direction::Both => return no_both_direction(ctx),
    };
    let reachable = ctx
        .backend
        .transitive_closure(source, Direction::Incoming, &[ctx.name])?;
    if reachable.iter().any(|e| &e.path == target) {
        return Err(InventoryError::CycleDetected {
            relationship: ctx.name.to_string(),
            source_path: source.to_string(),
            target: target.to_string(),
        });
    }
    Ok(())
}

fn no_diamonds(ctx: &RuleContext<'_>) -> Result<()> {
    let receiver = match ctx.direction {
        Direction::Outgoing => ctx.target,
        Direction::Incoming => ctx.origin,
        Direction::Both => return no_both_direction(ctx),
    };
    if ctx
        .backend
        .has_relationship(receiver, Direction::Incoming, ctx.name)?
    {
        return Err(InventoryError::DiamondDetected {
            relationship: ctx.name.to_string(),
            target: receiver.to_string(),
        });
    }
    Ok(())
}

fn immutable(ctx: &RuleContext<'_>) -> Result<()> {
    Err(InventoryError::ImmutableRelationship {
        relationship: ctx.name.to_string(),
    })
}

fn owned_by_entity_lifecycle(ctx: &RuleContext<'_>) -> Result<()> {
    Err(ctx.violation(
        "containment can only be removed by deleting the contained entity",
    ))
}

fn not_shadowed_by_contains(ctx: &RuleContext<'_>) -> Result<()> {
    for (source, target) in ctx.edges() {
        let contains = WellKnown::Contains.as_str();
        if ctx
            .backend
            .find_relationship(source, target, contains)?
            .is_some()
        {
            return Err(ctx.violation(format!(
                "{} contains {}; delete the contained entity instead",
                source, target
            )));
        }
    }
    Ok(())
}

fn single_environment_per_feed(ctx: &RuleContext<'_>) -> Result<()> {
    for (_, target) in ctx.edges() {
        if target.kind() == EntityKind::Feed
            && ctx
                .backend
                .has_relationship(target, Direction::Incoming, ctx.name)?
        {
            return Err(ctx.violation(format!(
                "feed {} is already incorporated by an environment",
                target
            )));
        }
    }
    Ok(())
}

fn metadata_pack_protection(ctx: &RuleContext<'_>) -> Result<()> {
    for (source, _) in ctx.edges() {
        if source.kind() == EntityKind::MetadataPack {
            return Err(InventoryError::MetadataPackProtected {
                path: source.to_string(),
                reason: "pack membership is fixed when the pack is created".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendProvider, MemoryBackend};
    use crate::model::{Definition, Entity, Properties};

    fn setup() -> (Box<dyn Backend>, CanonicalPath, CanonicalPath, CanonicalPath) {
        let backend = MemoryBackend::new();
        let mut tx = backend.start_transaction(true).unwrap();
        let t = CanonicalPath::tenant("t").unwrap();
        let e = t.extend(EntityKind::Environment, "e").unwrap();
        let rt = t.extend(EntityKind::ResourceType, "rt").unwrap();
        let a = e.extend(EntityKind::Resource, "a").unwrap();
        let b = e.extend(EntityKind::Resource, "b").unwrap();
        for p in [&t, &e] {
            tx.persist(Entity::new(p.clone(), Definition::Plain)).unwrap();
        }
        tx.persist(Entity::new(rt.clone(), Definition::Plain)).unwrap();
        for p in [&a, &b] {
            tx.persist(Entity::new(
                p.clone(),
                Definition::Resource {
                    resource_type: rt.clone(),
                },
            ))
            .unwrap();
        }
        tx.relate(&e, &a, "contains", Properties::new()).unwrap();
        tx.relate(&e, &b, "contains", Properties::new()).unwrap();
        (tx, e, a, b)
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let (tx, _, a, _) = setup();
        let err = check_create(tx.as_ref(), &a, Direction::Outgoing, "contains", &a).unwrap_err();
        assert!(matches!(err, InventoryError::CycleDetected { .. }));
    }

    #[test]
    fn test_second_container_is_a_diamond() {
        let (tx, _, a, b) = setup();
        let err = check_create(tx.as_ref(), &a, Direction::Outgoing, "contains", &b).unwrap_err();
        assert!(matches!(err, InventoryError::DiamondDetected { .. }));
    }

    #[test]
    fn test_closing_a_cycle_is_rejected_in_both_directions() {
        let (mut tx, _, a, b) = setup();
        tx.relate(&a, &b, "isParentOf", Properties::new()).unwrap();
        let out = check_create(tx.as_ref(), &b, Direction::Outgoing, "isParentOf", &a);
        assert!(matches!(out, Err(InventoryError::CycleDetected { .. })));
        let inc = check_create(tx.as_ref(), &a, Direction::Incoming, "isParentOf", &b);
        assert!(matches!(inc, Err(InventoryError::CycleDetected { .. })));
    }

    #[test]
    fn test_both_direction_is_rejected_for_hierarchy() {
        let (tx, _, a, b) = setup();
        let err = check_create(tx.as_ref(), &a, Direction::Both, "isParentOf", &b).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_immutable_relationships() {
        let (tx, _, a, b) = setup();
        for name in ["defines", "hasData"] {
            let err = check_create(tx.as_ref(), &a, Direction::Outgoing, name, &b).unwrap_err();
            assert!(matches!(err, InventoryError::ImmutableRelationship { .. }));
            let err = check_delete(tx.as_ref(), &a, Direction::Outgoing, name, &b).unwrap_err();
            assert!(matches!(err, InventoryError::ImmutableRelationship { .. }));
        }
    }

    #[test]
    fn test_contains_shadows_weaker_relationships() {
        let (tx, e, a, _) = setup();
        let err = check_delete(tx.as_ref(), &e, Direction::Outgoing, "incorporates", &a);
        assert!(matches!(err, Err(InventoryError::RuleViolation { .. })));
        let err = check_delete(tx.as_ref(), &a, Direction::Incoming, "isParentOf", &e);
        assert!(matches!(err, Err(InventoryError::RuleViolation { .. })));
    }

    #[test]
    fn test_custom_relationships_only_need_a_name() {
        let (tx, _, a, b) = setup();
        assert!(check_create(tx.as_ref(), &a, Direction::Both, "dependsOn", &b).is_ok());
        assert!(check_create(tx.as_ref(), &a, Direction::Outgoing, " ", &b).is_err());
    }
}
