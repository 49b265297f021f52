//! Target Resolution Service
//!
//! Pure domain logic for expanding a content item's subscriptions into the
//! set of endpoints it must be delivered to.

use crate::domain::entities::{Endpoint, Group, Subscriptions};
use crate::domain::value_objects::{EndpointId, GroupId};
use std::collections::{BTreeSet, HashMap};

/// Resolves subscriptions against the group hierarchy.
pub struct TargetResolver;

impl TargetResolver {
    /// Endpoints directly subscribed plus members of every subscribed group
    /// and its descendants, deduplicated and ordered by endpoint id.
    pub fn resolve(subscriptions: &Subscriptions, groups: &[Group], endpoints: &[Endpoint]) -> Vec<Endpoint> {
        let mut group_set = BTreeSet::new();
        for root in &subscriptions.groups {
            group_set.extend(Self::descendants(root, groups));
        }

        let mut seen: BTreeSet<EndpointId> = BTreeSet::new();
        let mut targets = Vec::new();
        for endpoint in endpoints {
            let subscribed = subscriptions.endpoints.contains(&endpoint.id)
                || endpoint.group_ids.iter().any(|g| group_set.contains(g));
            if subscribed && seen.insert(endpoint.id.clone()) {
                targets.push(endpoint.clone());
            }
        }

        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }

    /// `root` and all groups below it. Cycles in malformed data are cut.
    pub fn descendants(root: &GroupId, groups: &[Group]) -> BTreeSet<GroupId> {
        let mut children: HashMap<&GroupId, Vec<&GroupId>> = HashMap::new();
        for g in groups {
            if let Some(parent) = &g.parent_id {
                children.entry(parent).or_default().push(&g.id);
            }
        }

        let mut out = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !out.insert(id.clone()) {
                continue;
            }
            if let Some(kids) = children.get(id) {
                stack.extend(kids.iter().copied());
            }
        }
        out
    }

    /// True if making `parent` the parent of `group` would close a loop.
    pub fn would_cycle(group: &GroupId, parent: &GroupId, groups: &[Group]) -> bool {
        Self::descendants(group, groups).contains(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Credentials, TransportType};
    use chrono::Utc;

    fn group(id: &str, parent: Option<&str>) -> Group {
        Group {
            id: GroupId::new(id),
            name: id.to_string(),
            parent_id: parent.map(GroupId::new),
        }
    }

    fn endpoint(id: &str, groups: &[&str]) -> Endpoint {
        Endpoint {
            id: EndpointId::new(id),
            name: id.to_string(),
            transport_type: TransportType::RestPushV2,
            target_url: format!("https://{}.example/wp-json", id),
            credentials: Credentials::default(),
            group_ids: groups.iter().map(|g| GroupId::new(*g)).collect(),
            enabled: true,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            last_pull_at: None,
            created_at: Utc::now(),
        }
    }

    fn ids(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_group_subscription_targets_members() {
        let groups = vec![group("g", None)];
        let endpoints = vec![endpoint("a", &["g"]), endpoint("b", &["g"]), endpoint("c", &[])];
        let subs = Subscriptions {
            groups: [GroupId::new("g")].into_iter().collect(),
            ..Default::default()
        };

        assert_eq!(ids(&TargetResolver::resolve(&subs, &groups, &endpoints)), vec!["a", "b"]);
    }

    #[test]
    fn test_direct_and_group_subscription_deduplicated() {
        let groups = vec![group("g", None)];
        let endpoints = vec![endpoint("a", &["g"]), endpoint("b", &[])];
        let subs = Subscriptions {
            endpoints: [EndpointId::new("a"), EndpointId::new("b")].into_iter().collect(),
            groups: [GroupId::new("g")].into_iter().collect(),
        };

        assert_eq!(ids(&TargetResolver::resolve(&subs, &groups, &endpoints)), vec!["a", "b"]);
    }

    #[test]
    fn test_child_groups_are_included() {
        let groups = vec![group("world", None), group("europe", Some("world")), group("de", Some("europe"))];
        let endpoints = vec![endpoint("berlin", &["de"]), endpoint("lisbon", &["europe"])];
        let subs = Subscriptions {
            groups: [GroupId::new("world")].into_iter().collect(),
            ..Default::default()
        };

        assert_eq!(
            ids(&TargetResolver::resolve(&subs, &groups, &endpoints)),
            vec!["berlin", "lisbon"]
        );
    }

    #[test]
    fn test_empty_subscriptions_resolve_to_nothing() {
        let endpoints = vec![endpoint("a", &["g"])];
        assert!(TargetResolver::resolve(&Subscriptions::default(), &[], &endpoints).is_empty());
    }

    #[test]
    fn test_descendants_survive_cycles() {
        let groups = vec![group("a", Some("b")), group("b", Some("a"))];
        let d = TargetResolver::descendants(&GroupId::new("a"), &groups);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_would_cycle() {
        let groups = vec![group("root", None), group("child", Some("root"))];
        assert!(TargetResolver::would_cycle(&GroupId::new("root"), &GroupId::new("child"), &groups));
        assert!(!TargetResolver::would_cycle(&GroupId::new("child"), &GroupId::new("root"), &groups));
    }
}
