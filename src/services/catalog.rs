//! Catalog resolution helpers.
//!
//! Progress reporting and vendor receipts refer to items by name. The
//! fallback that creates a missing catalog record (with guessed defaults)
//! is isolated here as an explicit resolve-or-create step with an audit
//! log entry, instead of being an inline side effect of the reporting
//! workflows.

use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use tracing::warn;
use uuid::Uuid;

use crate::entities::item::{self, Entity as ItemEntity, ItemCategory};
use crate::errors::ServiceError;
use crate::services::matching::{find_first, normalize, NameMatcher};

const DEFAULT_UNIT: &str = "pcs";

/// Resolves an item by name using the given matcher; first match in
/// catalog order wins.
pub async fn resolve_by_name<C: ConnectionTrait>(
    conn: &C,
    matcher: &dyn NameMatcher,
    name: &str,
) -> Result<Option<item::Model>, ServiceError> {
    let items = ItemEntity::find().all(conn).await?;
    Ok(find_first(matcher, name, &items, |it| it.name.as_str()).cloned())
}

/// Resolves an item by name, creating a catalog record with default unit
/// and the given category when nothing matches.
///
/// Returns the item and whether it was created. Creation is warn-logged so
/// auto-created records are auditable and can be curated later.
pub async fn resolve_or_create<C: ConnectionTrait>(
    conn: &C,
    matcher: &dyn NameMatcher,
    name: &str,
    category: ItemCategory,
    actor_id: Uuid,
) -> Result<(item::Model, bool), ServiceError> {
    if normalize(name).is_empty() {
        return Err(ServiceError::ValidationError(
            "item name must not be empty".to_string(),
        ));
    }

    if let Some(existing) = resolve_by_name(conn, matcher, name).await? {
        return Ok((existing, false));
    }

    let code = generate_code(name);
    let created = item::ActiveModel {
        code: Set(code.clone()),
        name: Set(name.trim().to_string()),
        category: Set(category.as_str().to_string()),
        unit: Set(DEFAULT_UNIT.to_string()),
        current_stock: Set(0),
        reserved_stock: Set(0),
        stock_minimum: Set(0),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    warn!(
        item_code = %code,
        item_name = %name,
        category = category.as_str(),
        actor_id = %actor_id,
        "Auto-created catalog item with default unit and zero stock"
    );

    Ok((created, true))
}

fn generate_code(name: &str) -> String {
    let slug: String = normalize(name)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.len() > 24 { slug[..24].to_string() } else { slug };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("AUTO-{}-{}", slug, &suffix[..8])
}
