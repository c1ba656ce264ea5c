use lazy_static::lazy_static;
use regex::Regex;
use sqlx::{Postgres, Transaction};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9_\s-]").unwrap();
    static ref SEPARATORS: Regex = Regex::new(r"[\s-]+").unwrap();
}

/// URL-safe form of a display name: "Dell XPS 13 (2024)" -> "dell-xps-13-2024".
/// Accents are folded to their ASCII base letter; other non-ASCII is dropped.
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    SEPARATORS
        .replace_all(stripped.trim(), "-")
        .trim_matches(|c: char| c == '-' || c == '_')
        .to_string()
}

/// Tables that carry a unique `slug` column.
#[derive(Debug, Clone, Copy)]
pub enum SlugTable {
    Products,
    ProductCategories,
}

impl SlugTable {
    fn exists_query(self) -> &'static str {
        match self {
            SlugTable::Products => {
                "SELECT EXISTS(SELECT 1 FROM products WHERE slug = $1 AND id IS DISTINCT FROM $2)"
            }
            SlugTable::ProductCategories => {
                "SELECT EXISTS(SELECT 1 FROM product_categories WHERE slug = $1 AND id IS DISTINCT FROM $2)"
            }
        }
    }
}

fn candidate(base: &str, counter: u32) -> String {
    if counter == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, counter)
    }
}

/// First of `base`, `base-1`, `base-2`, ... not used by another row.
/// `owner` is the row being edited, whose own slug does not count as taken.
pub async fn unique_slug(
    tx: &mut Transaction<'_, Postgres>,
    table: SlugTable,
    base: &str,
    owner: Option<Uuid>,
) -> Result<String, sqlx::Error> {
    let base = if base.is_empty() { "item" } else { base };
    let mut counter = 0;
    loop {
        let slug = candidate(base, counter);
        let taken: bool = sqlx::query_scalar(table.exists_query())
            .bind(&slug)
            .bind(owner)
            .fetch_one(&mut **tx)
            .await?;
        if !taken {
            return Ok(slug);
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Dell XPS 13 (2024)"), "dell-xps-13-2024");
        assert_eq!(slugify("  Wi-Fi   Router -- Pro "), "wi-fi-router-pro");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn slugify_folds_accents_and_keeps_underscores() {
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        assert_eq!(slugify("Ñandú"), "nandu");
        assert_eq!(slugify("smart_home hub"), "smart_home-hub");
        assert_eq!(slugify("__draft__"), "draft");
        assert_eq!(slugify("日本"), "");
    }

    #[test]
    fn candidates_count_up_from_the_base() {
        assert_eq!(candidate("laptop", 0), "laptop");
        assert_eq!(candidate("laptop", 1), "laptop-1");
        assert_eq!(candidate("laptop", 12), "laptop-12");
    }
}
