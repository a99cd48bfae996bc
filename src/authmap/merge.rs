//! Pure merge of one request into an auth map document

use super::entry::{AuthDocument, AuthEntry, EntryKind, Operation, SyncRequest};
use crate::Error;

/// Result of merging a request into a document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Document after the merge
    pub document: AuthDocument,
    /// Whether the document differs from the input and needs persisting
    pub changed: bool,
}

/// Apply `request` to `document`.
///
/// Only the collection named by `request.kind` is touched. A removal of an
/// absent username fails with [`Error::NotFound`].
pub fn merge(mut document: AuthDocument, request: &SyncRequest) -> Result<MergeOutcome, Error> {
    let changed = match (&request.operation, request.kind) {
        (Operation::Upsert { arn, groups }, EntryKind::Role) => {
            upsert(&mut document.map_roles, &request.username, arn, groups)
        }
        (Operation::Upsert { arn, groups }, EntryKind::User) => {
            upsert(&mut document.map_users, &request.username, arn, groups)
        }
        (Operation::Remove, EntryKind::Role) => {
            remove(&mut document.map_roles, request.kind, &request.username)?
        }
        (Operation::Remove, EntryKind::User) => {
            remove(&mut document.map_users, request.kind, &request.username)?
        }
    };

    Ok(MergeOutcome { document, changed })
}

fn upsert<T: AuthEntry>(
    entries: &mut Vec<T>,
    username: &str,
    arn: &str,
    groups: &[String],
) -> bool {
    let wanted = T::new(arn.to_string(), username.to_string(), groups.to_vec());

    // Hand-edited maps can hold duplicate keys; every match is rewritten
    let mut found = false;
    let mut changed = false;
    for existing in entries
        .iter_mut()
        .filter(|existing| existing.upsert_key() == wanted.upsert_key())
    {
        found = true;
        if existing.groups() == wanted.groups() && existing.companion() == wanted.companion() {
            continue;
        }
        existing.set_groups(wanted.groups().to_vec());
        existing.set_companion(wanted.companion().to_string());
        changed = true;
    }

    if !found {
        entries.push(wanted);
        return true;
    }
    changed
}

fn remove<T: AuthEntry>(
    entries: &mut Vec<T>,
    kind: EntryKind,
    username: &str,
) -> Result<bool, Error> {
    let before = entries.len();
    entries.retain(|entry| entry.username() != username);
    if entries.len() == before {
        return Err(Error::not_found(kind, username));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authmap::{RoleEntry, UserEntry};

    const NODE_1_ARN: &str = "arn:aws:iam::1:role/n1";

    fn groups(gs: &[&str]) -> Vec<String> {
        gs.iter().map(|g| g.to_string()).collect()
    }

    fn seeded() -> AuthDocument {
        AuthDocument {
            map_roles: vec![RoleEntry {
                rolearn: "arn:aws:iam::0:role/node".to_string(),
                username: "system:node:{{EC2PrivateDNSName}}".to_string(),
                groups: groups(&["system:bootstrappers", "system:nodes"]),
            }],
            map_users: vec![UserEntry {
                userarn: "arn:aws:iam::0:user/admin".to_string(),
                username: "admin".to_string(),
                groups: groups(&["system:masters"]),
            }],
        }
    }

    // ==========================================================================
    // Story: a node role moves through its whole lifecycle
    // ==========================================================================

    #[test]
    fn story_node_role_lifecycle() {
        let upsert =
            SyncRequest::upsert(EntryKind::Role, "node-1", NODE_1_ARN, groups(&["g1", "g2"]));

        // First upsert inserts
        let first = merge(AuthDocument::default(), &upsert).unwrap();
        assert!(first.changed);
        assert_eq!(
            first.document.map_roles,
            vec![RoleEntry {
                rolearn: NODE_1_ARN.to_string(),
                username: "node-1".to_string(),
                groups: groups(&["g1", "g2"]),
            }]
        );

        // Identical upsert is a no-op
        let second = merge(first.document.clone(), &upsert).unwrap();
        assert!(!second.changed);
        assert_eq!(second.document, first.document);

        // Removal empties the collection
        let remove = SyncRequest::remove(EntryKind::Role, "node-1");
        let removed = merge(second.document, &remove).unwrap();
        assert!(removed.changed);
        assert!(removed.document.map_roles.is_empty());

        // Removing again reports the miss
        let err = merge(removed.document, &remove).unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntryKind::Role, .. }));
    }

    #[test]
    fn upsert_is_idempotent_for_both_kinds() {
        let requests = [
            SyncRequest::upsert(EntryKind::Role, "ops", "arn:role/ops", groups(&["a"])),
            SyncRequest::upsert(EntryKind::User, "bob", "arn:user/bob", groups(&["b", "c"])),
            SyncRequest::upsert(
                EntryKind::User,
                "admin",
                "arn:aws:iam::0:user/admin",
                groups(&["system:masters"]),
            ),
        ];
        for request in &requests {
            let once = merge(seeded(), request).unwrap();
            let twice = merge(once.document.clone(), request).unwrap();
            assert!(!twice.changed, "second merge of {request:?} changed the document");
            assert_eq!(twice.document, once.document);
        }
    }

    #[test]
    fn role_upsert_updates_arn_and_groups_in_place() {
        let mut doc = seeded();
        doc.map_roles.push(RoleEntry {
            rolearn: "arn:other".to_string(),
            username: "other".to_string(),
            groups: vec![],
        });

        let request = SyncRequest::upsert(
            EntryKind::Role,
            "system:node:{{EC2PrivateDNSName}}",
            "arn:aws:iam::0:role/new-node",
            groups(&["system:nodes"]),
        );
        let out = merge(doc, &request).unwrap();

        assert!(out.changed);
        assert_eq!(out.document.map_roles.len(), 2);
        assert_eq!(out.document.map_roles[0].rolearn, "arn:aws:iam::0:role/new-node");
        assert_eq!(out.document.map_roles[0].groups, groups(&["system:nodes"]));
        assert_eq!(out.document.map_roles[1].username, "other");
    }

    #[test]
    fn upsert_rewrites_every_entry_sharing_the_key() {
        let stale = RoleEntry {
            rolearn: "arn:old".to_string(),
            username: "node".to_string(),
            groups: groups(&["g0"]),
        };
        let doc = AuthDocument {
            map_roles: vec![stale.clone(), stale],
            map_users: vec![],
        };

        let request = SyncRequest::upsert(EntryKind::Role, "node", "arn:new", groups(&["g1"]));
        let out = merge(doc, &request).unwrap();

        assert!(out.changed);
        assert_eq!(out.document.map_roles.len(), 2);
        for role in &out.document.map_roles {
            assert_eq!(role.rolearn, "arn:new");
            assert_eq!(role.groups, groups(&["g1"]));
        }

        // Only the second duplicate differs: still a change
        let mut doc = out.document;
        doc.map_roles[1].groups = groups(&["g0"]);
        let out = merge(doc, &request).unwrap();
        assert!(out.changed);
        assert_eq!(out.document.map_roles[1].groups, groups(&["g1"]));

        // All duplicates current: no-op
        assert!(!merge(out.document, &request).unwrap().changed);
    }

    #[test]
    fn group_order_is_significant() {
        let request = SyncRequest::upsert(
            EntryKind::Role,
            "system:node:{{EC2PrivateDNSName}}",
            "arn:aws:iam::0:role/node",
            groups(&["system:nodes", "system:bootstrappers"]),
        );
        assert!(merge(seeded(), &request).unwrap().changed);
    }

    #[test]
    fn user_upsert_is_keyed_by_arn() {
        // Same ARN, new username: updated in place
        let renamed = SyncRequest::upsert(
            EntryKind::User,
            "root",
            "arn:aws:iam::0:user/admin",
            groups(&["system:masters"]),
        );
        let out = merge(seeded(), &renamed).unwrap();
        assert!(out.changed);
        assert_eq!(out.document.map_users.len(), 1);
        assert_eq!(out.document.map_users[0].username, "root");

        // Same username, new ARN: a second entry
        let other_arn = SyncRequest::upsert(
            EntryKind::User,
            "admin",
            "arn:aws:iam::0:user/admin-2",
            groups(&["system:masters"]),
        );
        let out = merge(seeded(), &other_arn).unwrap();
        assert_eq!(out.document.map_users.len(), 2);
    }

    #[test]
    fn collections_are_disjoint() {
        let doc = seeded();

        let request = SyncRequest::upsert(EntryKind::Role, "x", "arn:x", vec![]);
        let out = merge(doc.clone(), &request).unwrap();
        assert_eq!(out.document.map_users, doc.map_users);

        let out = merge(doc.clone(), &SyncRequest::remove(EntryKind::User, "admin")).unwrap();
        assert_eq!(out.document.map_roles, doc.map_roles);
        assert!(out.document.map_users.is_empty());

        // A username present only among users is not found among roles
        let err = merge(doc, &SyncRequest::remove(EntryKind::Role, "admin")).unwrap_err();
        assert_eq!(err.to_string(), "mapRole with username 'admin' not found in auth map");
    }

    #[test]
    fn removal_drops_exactly_the_matching_entry() {
        let mut doc = seeded();
        for name in ["a", "b", "c"] {
            let request = SyncRequest::upsert(EntryKind::Role, name, format!("arn:{name}"), vec![]);
            doc = merge(doc, &request).unwrap().document;
        }
        let before = doc.map_roles.len();

        let out = merge(doc, &SyncRequest::remove(EntryKind::Role, "b")).unwrap();
        assert!(out.changed);
        assert_eq!(out.document.map_roles.len(), before - 1);
        let names: Vec<_> = out.document.map_roles.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["system:node:{{EC2PrivateDNSName}}", "a", "c"]);
    }

    #[test]
    fn keys_stay_unique_across_mixed_operations() {
        let ops = [
            SyncRequest::upsert(EntryKind::Role, "a", "arn:1", vec![]),
            SyncRequest::upsert(EntryKind::Role, "a", "arn:2", groups(&["g"])),
            SyncRequest::upsert(EntryKind::Role, "b", "arn:1", vec![]),
            SyncRequest::upsert(EntryKind::User, "u", "arn:u", vec![]),
            SyncRequest::upsert(EntryKind::User, "u2", "arn:u", groups(&["g"])),
            SyncRequest::remove(EntryKind::Role, "b"),
            SyncRequest::upsert(EntryKind::Role, "b", "arn:3", vec![]),
        ];

        let mut doc = AuthDocument::default();
        for op in &ops {
            doc = merge(doc, op).unwrap().document;
        }

        let mut role_keys: Vec<_> = doc.map_roles.iter().map(|r| r.username.clone()).collect();
        role_keys.sort();
        role_keys.dedup();
        assert_eq!(role_keys.len(), doc.map_roles.len());

        let mut user_keys: Vec<_> = doc.map_users.iter().map(|u| u.userarn.clone()).collect();
        user_keys.sort();
        user_keys.dedup();
        assert_eq!(user_keys.len(), doc.map_users.len());
        assert_eq!(doc.map_users.len(), 1);
        assert_eq!(doc.map_users[0].username, "u2");
    }
}
