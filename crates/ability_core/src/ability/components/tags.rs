use super::super::component::{AbilityComponent, LifecycleContext};
use crate::error::Result;
use crate::tags::TagMap;

/// Adds a fixed tag map under the ability's id while granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagComponent {
    tags: TagMap,
}

impl TagComponent {
    /// Component granting `tags`.
    #[must_use]
    pub const fn new(tags: TagMap) -> Self {
        Self { tags }
    }

    /// Tags granted.
    #[must_use]
    pub const fn tags(&self) -> &TagMap {
        &self.tags
    }
}

impl AbilityComponent for TagComponent {
    fn name(&self) -> &str {
        "tags"
    }

    fn on_apply(&mut self, ctx: &mut LifecycleContext<'_>) -> Result<()> {
        ctx.tags.add_component_tags(ctx.ability_id, &self.tags);
        Ok(())
    }

    fn on_remove(&mut self, ctx: &mut LifecycleContext<'_>) {
        ctx.tags.remove_component_tags(ctx.ability_id);
    }
}
