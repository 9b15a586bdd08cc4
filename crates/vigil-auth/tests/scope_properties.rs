//! Scope narrowing properties across every role, checked against a small
//! two-district hierarchy.

use serde_json::json;
use std::sync::Arc;
use vigil_auth::{
    Filter, GeographicScope, MemoryHierarchy, PermissionMatrix, ScopeResolver, Session,
};
use vigil_types::{Identity, IdentityId, NodeId, Role, SessionId, Tier};

fn resolver() -> ScopeResolver {
    ScopeResolver::new(Arc::new(
        MemoryHierarchy::new()
            .with_district("D1")
            .with_district("D2")
            .with_mandal("M1", "D1")
            .with_mandal("M4", "D2")
            .with_centre("C7", "M1")
            .with_centre("C9", "M4"),
    ))
}

fn assignment(role: Role) -> Option<NodeId> {
    role.confining_tier().map(|tier| {
        NodeId::new(match tier {
            Tier::District => "D1",
            Tier::Mandal => "M1",
            Tier::Centre => "C7",
        })
    })
}

fn base_filters() -> Vec<Filter> {
    vec![
        Filter::new(),
        Filter::new().where_eq("status", "OPEN"),
        Filter::new().where_eq("status", "OPEN").where_eq("severity", 2),
        Filter::new().where_eq("mandalId", "M4"),
    ]
}

#[test]
fn filter_for_every_role_is_idempotent_and_additive() {
    let r = resolver();
    for role in Role::ALL {
        let scope = r
            .resolve_scope(role, assignment(role).as_ref())
            .expect("resolve");
        for base in base_filters() {
            let once = r
                .build_filter_for(role, &scope, base.clone())
                .expect("first pass");
            let twice = r
                .build_filter_for(role, &scope, once.clone().into_filter())
                .expect("second pass");
            assert_eq!(once, twice, "{role} {base}");

            for (field, value) in base.clauses() {
                assert_eq!(once.get(field), Some(value), "{role} dropped {field}");
            }
            if scope.is_unrestricted() {
                assert_eq!(once.as_filter(), &base);
            }
        }
    }
}

#[test]
fn live_rows_outside_scope_never_match() {
    let r = resolver();
    let rows = [
        json!({"districtId": "D1", "mandalId": "M1", "centreId": "C7", "status": "OPEN"}),
        json!({"districtId": "D2", "mandalId": "M4", "centreId": "C9", "status": "OPEN"}),
    ];
    for role in Role::ALL {
        let scope = r
            .resolve_scope(role, assignment(role).as_ref())
            .expect("resolve");
        let filter = r
            .build_filter(&scope, Filter::new().where_eq("status", "OPEN"))
            .expect("build");
        let visible: Vec<bool> = rows.iter().map(|row| filter.matches(row)).collect();
        let expected = if role == Role::SuperAdmin {
            vec![true, true]
        } else {
            vec![true, false]
        };
        assert_eq!(visible, expected, "{role}");
    }
}

#[test]
fn query_and_visibility_agree_on_centres() {
    let r = resolver();
    for role in Role::ALL {
        let scope = r
            .resolve_scope(role, assignment(role).as_ref())
            .expect("resolve");
        for centre in ["C7", "C9"] {
            let node = NodeId::new(centre);
            let visible = r.can_view_for(role, &scope, &node, Tier::Centre).expect("view");
            let row = if centre == "C7" {
                json!({"districtId": "D1", "mandalId": "M1", "centreId": "C7"})
            } else {
                json!({"districtId": "D2", "mandalId": "M4", "centreId": "C9"})
            };
            let filter = r.build_filter(&scope, Filter::new()).expect("build");
            assert_eq!(filter.matches(&row), visible, "{role} {centre}");
        }
    }
}

#[test]
fn capabilities_do_not_depend_on_scope() {
    let r = resolver();
    let sessions: Vec<Session> = ["M1", "M4"]
        .into_iter()
        .map(|node| {
            let scope = r
                .resolve_scope(Role::MandalInCharge, Some(&NodeId::new(node)))
                .expect("resolve");
            Session::new(
                SessionId::new(),
                Identity::new(IdentityId::named(node), node),
                Role::MandalInCharge,
                scope,
            )
        })
        .collect();
    assert_ne!(sessions[0].scope(), sessions[1].scope());
    assert_eq!(sessions[0].capabilities(), sessions[1].capabilities());
    assert_eq!(
        sessions[0].capabilities(),
        PermissionMatrix::capabilities_for(Role::MandalInCharge)
    );
    assert_eq!(
        sessions[0].scope(),
        &GeographicScope::confined(Tier::Mandal, NodeId::new("M1"))
    );
}
