//! Tag stack counts aggregated from three independent sources.
//!
//! - **Loose** stacks are added and removed by hand and never expire.
//! - **Timed** stacks: every add creates one layer that expires on its own
//!   against the container's logical clock.
//! - **Component** stacks are owned by an ability and removed in bulk when
//!   that ability detaches.
//!
//! Reads always return the sum of the three. A tag with zero total stacks
//! is indistinguishable from one that never existed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::AbilityId;
use crate::observer::{Observers, Subscription};

/// Tag name to stack count.
pub type TagMap = BTreeMap<String, u32>;

/// Total stack count change for one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    /// Tag name.
    pub tag: String,
    /// Total stacks before.
    pub old_stacks: u32,
    /// Total stacks after.
    pub new_stacks: u32,
}

/// Narrow tag write capability handed to ability components.
pub trait TagTarget {
    /// Add loose stacks.
    fn add_loose_tag(&mut self, tag: &str, stacks: u32);

    /// Remove loose stacks, saturating at zero.
    fn remove_loose_tag(&mut self, tag: &str, stacks: u32);

    /// Add one timed layer expiring `duration_ms` from now.
    fn add_auto_duration_tag(&mut self, tag: &str, duration_ms: u64);

    /// Merge `tags` into the stacks owned by `owner`.
    fn add_component_tags(&mut self, owner: AbilityId, tags: &TagMap);

    /// Drop every stack owned by `owner`. Returns `false` if it owned none.
    fn remove_component_tags(&mut self, owner: AbilityId) -> bool;

    /// Total stacks for `tag`.
    fn tag_stacks(&self, tag: &str) -> u32;

    /// Whether `tag` has any stacks.
    fn has_tag(&self, tag: &str) -> bool {
        self.tag_stacks(tag) > 0
    }

    /// Logical time the container is at.
    fn now(&self) -> u64;
}

/// Per-actor tag store.
#[derive(Debug, Default)]
pub struct TagContainer {
    loose: TagMap,
    timed: BTreeMap<String, Vec<u64>>,
    component: BTreeMap<AbilityId, TagMap>,
    now: u64,
    observers: Observers<TagChange>,
}

impl TagContainer {
    /// Empty container at logical time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty container at logical time `now`.
    #[must_use]
    pub fn starting_at(now: u64) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Current logical time.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Loose stacks only.
    #[must_use]
    pub fn loose_stacks(&self, tag: &str) -> u32 {
        self.loose.get(tag).copied().unwrap_or(0)
    }

    fn timed_stacks(&self, tag: &str) -> u32 {
        self.timed.get(tag).map_or(0, |layers| {
            let live = layers.iter().filter(|&&expires| self.now < expires).count();
            u32::try_from(live).unwrap_or(u32::MAX)
        })
    }

    fn component_stacks(&self, tag: &str) -> u32 {
        self.component
            .values()
            .filter_map(|tags| tags.get(tag))
            .fold(0u32, |acc, &n| acc.saturating_add(n))
    }

    /// Total stacks: loose + unexpired timed layers + component stacks.
    #[must_use]
    pub fn tag_stacks(&self, tag: &str) -> u32 {
        self.loose_stacks(tag)
            .saturating_add(self.timed_stacks(tag))
            .saturating_add(self.component_stacks(tag))
    }

    /// Whether `tag` has any stacks.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag_stacks(tag) > 0
    }

    /// Every tag with a non-zero total.
    #[must_use]
    pub fn all_tags(&self) -> TagMap {
        self.known_tags()
            .into_iter()
            .filter_map(|tag| {
                let stacks = self.tag_stacks(&tag);
                (stacks > 0).then_some((tag, stacks))
            })
            .collect()
    }

    fn known_tags(&self) -> BTreeSet<String> {
        self.loose
            .keys()
            .chain(self.timed.keys())
            .chain(self.component.values().flat_map(BTreeMap::keys))
            .cloned()
            .collect()
    }

    /// Add loose stacks.
    pub fn add_loose_tag(&mut self, tag: &str, stacks: u32) {
        if stacks == 0 {
            return;
        }
        self.tracked([tag.to_string()], |c| {
            let entry = c.loose.entry(tag.to_string()).or_insert(0);
            *entry = entry.saturating_add(stacks);
        });
    }

    /// Remove loose stacks, saturating at zero.
    pub fn remove_loose_tag(&mut self, tag: &str, stacks: u32) {
        if self.loose_stacks(tag) == 0 {
            return;
        }
        self.tracked([tag.to_string()], |c| {
            if let Some(entry) = c.loose.get_mut(tag) {
                *entry = entry.saturating_sub(stacks);
                if *entry == 0 {
                    c.loose.remove(tag);
                }
            }
        });
    }

    /// Add one timed layer expiring at `now + duration_ms`.
    ///
    /// A layer is live while `now < expires_at`, so a zero duration adds
    /// nothing.
    pub fn add_auto_duration_tag(&mut self, tag: &str, duration_ms: u64) {
        if duration_ms == 0 {
            return;
        }
        let expires_at = self.now.saturating_add(duration_ms);
        self.tracked([tag.to_string()], |c| {
            c.timed.entry(tag.to_string()).or_default().push(expires_at);
        });
    }

    /// Merge `tags` into the stacks owned by `owner`.
    pub fn add_component_tags(&mut self, owner: AbilityId, tags: &TagMap) {
        if tags.values().all(|&n| n == 0) {
            return;
        }
        self.tracked(tags.keys().cloned(), |c| {
            let owned = c.component.entry(owner).or_default();
            for (tag, &stacks) in tags {
                if stacks > 0 {
                    let entry = owned.entry(tag.clone()).or_insert(0);
                    *entry = entry.saturating_add(stacks);
                }
            }
        });
    }

    /// Drop every stack owned by `owner`.
    pub fn remove_component_tags(&mut self, owner: AbilityId) -> bool {
        let Some(owned) = self.component.get(&owner) else {
            return false;
        };
        let affected: Vec<String> = owned.keys().cloned().collect();
        self.tracked(affected, |c| {
            c.component.remove(&owner);
        });
        true
    }

    /// Advance the clock by `dt_ms` and purge expired layers.
    pub fn tick(&mut self, dt_ms: u64) {
        let target = self.now.saturating_add(dt_ms);
        self.advance_to(target);
    }

    /// Move the clock to `now` and purge expired layers.
    ///
    /// Fires one change per tag whose total dropped.
    pub fn advance_to(&mut self, now: u64) {
        debug_assert!(
            now >= self.now,
            "tag clock must not go backwards ({} -> {now})",
            self.now
        );
        if now <= self.now {
            return;
        }
        let affected: Vec<String> = self.timed.keys().cloned().collect();
        self.tracked(affected, |c| {
            c.now = now;
            c.timed.retain(|_, layers| {
                layers.retain(|&expires| now < expires);
                !layers.is_empty()
            });
        });
    }

    /// Run `mutate` and notify listeners for each of `tags` whose total
    /// changed.
    fn tracked(
        &mut self,
        tags: impl IntoIterator<Item = String>,
        mutate: impl FnOnce(&mut Self),
    ) {
        let before: Vec<(String, u32)> = tags
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|tag| {
                let stacks = self.tag_stacks(&tag);
                (tag, stacks)
            })
            .collect();

        mutate(self);

        for (tag, old_stacks) in before {
            let new_stacks = self.tag_stacks(&tag);
            if old_stacks != new_stacks {
                self.observers.notify(&TagChange {
                    tag,
                    old_stacks,
                    new_stacks,
                });
            }
        }
    }

    /// Subscribe to total stack changes.
    pub fn subscribe(&mut self, listener: impl FnMut(&TagChange) + 'static) -> Subscription {
        self.observers.subscribe(listener)
    }

    /// Remove a change listener.
    pub fn unsubscribe(&mut self, handle: Subscription) -> bool {
        self.observers.unsubscribe(handle)
    }

    /// Number of live change listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.observers.len()
    }

    /// Plain data copy of all three sources.
    #[must_use]
    pub fn snapshot(&self) -> TagContainerSnapshot {
        TagContainerSnapshot {
            now: self.now,
            loose: self.loose.clone(),
            timed: self.timed.clone(),
            component: self.component.clone(),
        }
    }

    /// Rebuild a container from a snapshot, without listeners.
    #[must_use]
    pub fn restore(snapshot: &TagContainerSnapshot) -> Self {
        Self {
            loose: snapshot.loose.clone(),
            timed: snapshot.timed.clone(),
            component: snapshot.component.clone(),
            now: snapshot.now,
            observers: Observers::new(),
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut impl std::hash::Hasher) {
        use std::hash::Hash;
        self.all_tags().hash(hasher);
    }
}

impl TagTarget for TagContainer {
    fn add_loose_tag(&mut self, tag: &str, stacks: u32) {
        Self::add_loose_tag(self, tag, stacks);
    }

    fn remove_loose_tag(&mut self, tag: &str, stacks: u32) {
        Self::remove_loose_tag(self, tag, stacks);
    }

    fn add_auto_duration_tag(&mut self, tag: &str, duration_ms: u64) {
        Self::add_auto_duration_tag(self, tag, duration_ms);
    }

    fn add_component_tags(&mut self, owner: AbilityId, tags: &TagMap) {
        Self::add_component_tags(self, owner, tags);
    }

    fn remove_component_tags(&mut self, owner: AbilityId) -> bool {
        Self::remove_component_tags(self, owner)
    }

    fn tag_stacks(&self, tag: &str) -> u32 {
        Self::tag_stacks(self, tag)
    }

    fn now(&self) -> u64 {
        self.now
    }
}

/// Serializable state of a [`TagContainer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagContainerSnapshot {
    /// Logical time.
    pub now: u64,
    /// Loose stacks.
    pub loose: TagMap,
    /// Expiry times of live timed layers.
    pub timed: BTreeMap<String, Vec<u64>>,
    /// Component stacks by owning ability.
    pub component: BTreeMap<AbilityId, TagMap>,
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn tags(pairs: &[(&str, u32)]) -> TagMap {
        pairs.iter().map(|(t, n)| ((*t).to_string(), *n)).collect()
    }

    #[test]
    fn test_three_sources_sum() {
        let mut container = TagContainer::new();
        container.add_loose_tag("burn", 2);
        container.add_auto_duration_tag("burn", 1_000);
        container.add_auto_duration_tag("burn", 3_000);
        container.add_component_tags(AbilityId(7), &tags(&[("burn", 4)]));
        assert_eq!(container.tag_stacks("burn"), 8);

        container.tick(1_000);
        assert_eq!(container.tag_stacks("burn"), 7);
    }

    #[test]
    fn test_timed_layer_expires() {
        let mut container = TagContainer::new();
        container.add_auto_duration_tag("haste", 500);
        container.tick(499);
        assert!(container.has_tag("haste"));
        container.tick(2);
        assert_eq!(container.tag_stacks("haste"), 0);
        assert!(container.all_tags().is_empty());
    }

    #[test]
    fn test_component_removal_leaves_other_sources() {
        let mut container = TagContainer::new();
        container.add_loose_tag("shield", 1);
        container.add_auto_duration_tag("shield", 10_000);
        container.add_component_tags(AbilityId(1), &tags(&[("shield", 3), ("armored", 1)]));
        container.add_component_tags(AbilityId(2), &tags(&[("shield", 5)]));

        assert!(container.remove_component_tags(AbilityId(1)));
        assert_eq!(container.tag_stacks("shield"), 7);
        assert!(!container.has_tag("armored"));
        assert!(!container.remove_component_tags(AbilityId(1)));
    }

    #[test]
    fn test_loose_removal_saturates() {
        let mut container = TagContainer::new();
        container.add_loose_tag("wet", 1);
        container.remove_loose_tag("wet", 5);
        assert_eq!(container.tag_stacks("wet"), 0);
        container.add_loose_tag("wet", 1);
        assert_eq!(container.tag_stacks("wet"), 1);
    }

    #[test]
    fn test_tick_notifies_once_per_changed_tag() {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let mut container = TagContainer::new();
        container.add_auto_duration_tag("a", 100);
        container.add_auto_duration_tag("a", 100);
        container.add_auto_duration_tag("b", 500);

        let sink = Rc::clone(&changes);
        container.subscribe(move |c| sink.borrow_mut().push(c.clone()));
        container.tick(200);

        let seen = changes.borrow();
        assert_eq!(
            *seen,
            vec![TagChange {
                tag: "a".into(),
                old_stacks: 2,
                new_stacks: 0
            }]
        );
    }

    #[test]
    fn test_zero_duration_is_noop() {
        let mut container = TagContainer::new();
        container.add_auto_duration_tag("blink", 0);
        assert!(!container.has_tag("blink"));
    }

    #[test]
    fn test_snapshot_keeps_layer_expiry() {
        let mut container = TagContainer::starting_at(1_000);
        container.add_auto_duration_tag("slow", 400);
        container.add_loose_tag("marked", 2);
        container.add_component_tags(AbilityId(9), &tags(&[("aura", 1)]));

        let mut restored = TagContainer::restore(&container.snapshot());
        assert_eq!(restored.all_tags(), container.all_tags());
        restored.tick(400);
        assert!(!restored.has_tag("slow"));
        assert_eq!(restored.listener_count(), 0);
    }
}
