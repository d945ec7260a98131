//! Category seeding for a tablet database
//!
//! Categories are inserted with a plain INSERT, so an id that is already
//! present is reported and left untouched rather than overwritten.

use crate::db::{Database, NewCategory};
use crate::error::{Error, Result};
use crate::restore::{CATEGORIES, MENU_ITEMS};
use diesel::result::DatabaseErrorKind;
use serde::{Deserialize, Serialize};

/// A category to seed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SeedCategory {
    /// Defaults to `cat_<slug of name>`
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_color() -> String {
    "#FF6B6B".to_string()
}

fn default_icon() -> String {
    "🍽️".to_string()
}

fn default_active() -> bool {
    true
}

impl SeedCategory {
    fn new(name: &str, description: &str, color: &str, icon: &str, sort_order: i32) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: description.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            sort_order,
            is_active: true,
        }
    }

    /// The explicit id, or one derived from the name
    pub fn resolved_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| category_id(&self.name))
    }
}

/// `cat_` followed by the lowercased name with runs of non-alphanumerics
/// collapsed to `_`
pub fn category_id(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    format!("cat_{}", slug)
}

/// The restaurant's menu categories
pub fn default_categories() -> Vec<SeedCategory> {
    vec![
        SeedCategory::new(
            "SOUPS",
            "Hot and cold soups including Manchow, Cream of Tomato, and more",
            "#FF6B6B",
            "🍲",
            1,
        ),
        SeedCategory::new(
            "BREADS",
            "Fresh Indian breads including Naan, Roti, Paratha, and Kulcha",
            "#FFE66D",
            "🫓",
            2,
        ),
        SeedCategory::new(
            "KIDS MENU",
            "Kid-friendly dishes with mild flavors and smaller portions",
            "#4ECDC4",
            "👶",
            3,
        ),
        SeedCategory::new(
            "MAIN COURSE - NON VEG",
            "Non-vegetarian main dishes including chicken, goat, and fish curries",
            "#FF8A80",
            "🍗",
            4,
        ),
        SeedCategory::new(
            "MAIN COURSE - VEG",
            "Vegetarian main dishes including paneer, dal, and vegetable curries",
            "#81C784",
            "🥬",
            5,
        ),
        SeedCategory::new(
            "STARTER - NON VEG",
            "Non-vegetarian appetizers and kebabs",
            "#FFB74D",
            "🍖",
            6,
        ),
        SeedCategory::new(
            "STARTER - VEG",
            "Vegetarian appetizers and kebabs",
            "#A5D6A7",
            "🥗",
            7,
        ),
        SeedCategory::new(
            "STARTER - HAKKA",
            "Chinese-style appetizers and Hakka dishes",
            "#FFCC02",
            "🥢",
            8,
        ),
        SeedCategory::new(
            "MOMOS (DUMPLINGS)",
            "Steamed and fried dumplings with various fillings and sauces",
            "#E1BEE7",
            "🥟",
            9,
        ),
        SeedCategory::new(
            "SNACKS",
            "Indian street food and snacks including Samosa, Vada Pav, and Chaat",
            "#FFAB91",
            "🍿",
            10,
        ),
    ]
}

/// Result of a seeding run
#[derive(Debug, Default)]
pub struct SeedOutcome {
    /// Names of categories inserted
    pub added: Vec<String>,
    /// Names skipped because their id was already present
    pub existing: Vec<String>,
    /// Other per-row failures
    pub failed: Vec<Error>,
    /// Rows in the categories table afterwards
    pub total: i64,
}

/// Insert `categories` into the database
///
/// With `init_schema`, the categories and menu_items tables are created
/// first when missing. Without it, a database lacking a categories table is
/// an error.
pub fn seed_categories(
    db: &Database,
    categories: &[SeedCategory],
    init_schema: bool,
    now: &str,
) -> Result<SeedOutcome> {
    if init_schema {
        db.execute_batch(&format!("{}\n{}", CATEGORIES.create_sql(), MENU_ITEMS.create_sql()))?;
    } else if !db.has_table(CATEGORIES.table)? {
        return Err(Error::MissingTable(CATEGORIES.table.to_string()));
    }

    let mut outcome = SeedOutcome::default();
    for category in categories {
        let id = category.resolved_id();
        let row = NewCategory {
            id: &id,
            name: &category.name,
            description: Some(&category.description),
            color: Some(&category.color),
            icon: Some(&category.icon),
            sort_order: category.sort_order,
            is_active: category.is_active,
            created_at: now,
            updated_at: now,
        };

        match db.insert_category(&row) {
            Ok(()) => {
                tracing::debug!(id = %id, name = %category.name, "category added");
                outcome.added.push(category.name.clone());
            }
            Err(Error::Query(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => {
                tracing::info!(id = %id, name = %category.name, "category already exists");
                outcome.existing.push(category.name.clone());
            }
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "category insert failed");
                outcome.failed.push(Error::record(CATEGORIES.table, &id, e));
            }
        }
    }

    outcome.total = db.count_categories()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: &str = "2025-08-29T23:41:19.000";

    fn scratch_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("pos.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_category_ids() {
        assert_eq!(category_id("SOUPS"), "cat_soups");
        assert_eq!(category_id("KIDS MENU"), "cat_kids_menu");
        assert_eq!(category_id("MAIN COURSE - NON VEG"), "cat_main_course_non_veg");
        assert_eq!(category_id("MOMOS (DUMPLINGS)"), "cat_momos_dumplings");
    }

    #[test]
    fn test_default_categories() {
        let categories = default_categories();
        assert_eq!(categories.len(), 10);
        let ids: Vec<String> = categories.iter().map(SeedCategory::resolved_id).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(categories[9].name, "SNACKS");
        assert_eq!(categories[9].sort_order, 10);
    }

    #[test]
    fn test_seed_requires_table() {
        let (_dir, db) = scratch_db();
        let err = seed_categories(&db, &default_categories(), false, NOW).unwrap_err();
        assert!(matches!(err, Error::MissingTable(_)));
    }

    #[test]
    fn test_seed_twice_reports_existing() {
        let (_dir, db) = scratch_db();
        let first = seed_categories(&db, &default_categories(), true, NOW).unwrap();
        assert_eq!(first.added.len(), 10);
        assert!(first.existing.is_empty());
        assert_eq!(first.total, 10);

        let second = seed_categories(&db, &default_categories(), false, NOW).unwrap();
        assert!(second.added.is_empty());
        assert_eq!(second.existing.len(), 10);
        assert!(second.failed.is_empty());
        assert_eq!(second.total, 10);

        let stored = db.list_categories().unwrap();
        assert_eq!(stored[0].id, "cat_soups");
        assert_eq!(stored[0].icon.as_deref(), Some("🍲"));
        assert_eq!(stored[0].created_at, NOW);
        assert!(stored[0].is_active);
        assert!(db.has_table("menu_items").unwrap());
    }

    #[test]
    fn test_explicit_id_is_used() {
        let (_dir, db) = scratch_db();
        let mut custom = SeedCategory::new("DESSERTS", "Sweet things", "#FFFFFF", "🍨", 11);
        custom.id = Some("cat_sweets".to_string());
        seed_categories(&db, &[custom], true, NOW).unwrap();
        assert_eq!(db.list_categories().unwrap()[0].id, "cat_sweets");
    }
}
