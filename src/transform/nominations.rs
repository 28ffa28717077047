use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

use crate::table::{Table, Value};

/// Classical categories whose nominations without artist or workers are dropped.
pub const CLASSICAL_CATEGORIES: &[&str] = &[
    "Best Classical Vocal Soloist Performance",
    "Best Classical Vocal Performance",
    "Best Small Ensemble Performance (With Or Without Conductor)",
    "Best Classical Performance - Instrumental Soloist Or Soloists (With Or Without Orchestra)",
    "Most Promising New Classical Recording Artist",
    "Best Classical Performance - Vocal Soloist (With Or Without Orchestra)",
    "Best New Classical Artist",
    "Best Classical Vocal Soloist",
    "Best Performance - Instrumental Soloist Or Soloists (With Or Without Orchestra)",
    "Best Classical Performance - Vocal Soloist",
];

/// Credits in `workers` that name a performing artist.
pub const ROLES_OF_INTEREST: &[&str] = &[
    "artist",
    "artists",
    "composer",
    "conductor",
    "conductor/soloist",
    "choir director",
    "chorus master",
    "graphic designer",
    "soloist",
    "soloists",
    "ensembles",
];

static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((.*?)\)").expect("parenthesized pattern should compile"));

static NAME_BEFORE_ROLE: Lazy<Regex> = Lazy::new(|| {
    let roles: Vec<String> = ROLES_OF_INTEREST.iter().map(|r| regex::escape(r)).collect();
    Regex::new(&format!(r"(?i)([^;]+)\s*,\s*(?:{})", roles.join("|")))
        .expect("role pattern should compile")
});

/// Text inside the first pair of parentheses.
pub fn extract_artist(workers: &str) -> Option<String> {
    PARENTHESIZED
        .captures(workers)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `workers` itself, when it names a single credit.
pub fn single_worker(workers: &str) -> Option<String> {
    if workers.contains(';') || workers.contains(',') {
        None
    } else {
        Some(workers.to_string())
    }
}

/// The first `;` segment when it carries no role annotation.
pub fn extract_artists_before_semicolon(workers: &str) -> Option<String> {
    let first = workers.split(';').next().unwrap_or("").trim();
    let lower = first.to_lowercase();
    if first.contains(',') || ROLES_OF_INTEREST.iter().any(|r| lower.contains(r)) {
        None
    } else {
        Some(first.to_string())
    }
}

/// Every name credited with one of the roles of interest, joined by `", "`.
pub fn extract_roles_based_on_interest(workers: &str) -> Option<String> {
    let names: Vec<&str> = NAME_BEFORE_ROLE
        .captures_iter(workers)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(", ").trim().to_string())
    }
}

/// Fill null artists from `workers` with `rule`.
fn fill_artist_from_workers<F>(table: &mut Table, rule: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let artist = table.column_index("artist")?;
    let workers = table.column_index("workers")?;
    for row in table.rows_mut() {
        if !row[artist].is_null() {
            continue;
        }
        if let Value::Text(w) = &row[workers] {
            if let Some(found) = rule(w.as_str()) {
                row[artist] = Value::Text(found);
            }
        }
    }
    Ok(())
}

/// Clean the nominations dataset and resolve an artist for every row.
#[instrument(level = "info", skip(table))]
pub fn transform_nominations(mut table: Table) -> Result<Table> {
    let (rows, cols) = table.shape();
    info!(
        "Starting transformation. The nominations dataset has {} rows and {} columns.",
        rows, cols
    );

    table.rename_column("winner", "is_nominated")?;
    table.drop_columns(&["published_at", "updated_at", "img"])?;
    table.drop_nulls(Some(&["nominee"]))?;

    // rows with neither artist nor workers: classical ones go, the rest use the nominee
    let artist = table.column_index("artist")?;
    let workers = table.column_index("workers")?;
    let category = table.column_index("category")?;
    let nominee = table.column_index("nominee")?;
    let both_null = |row: &[Value]| row[artist].is_null() && row[workers].is_null();
    table.retain_rows(|row| {
        !(both_null(row)
            && row[category]
                .as_str()
                .map_or(false, |c| CLASSICAL_CATEGORIES.contains(&c)))
    });
    for row in table.rows_mut() {
        if both_null(&row[..]) {
            row[artist] = row[nominee].clone();
        }
    }

    fill_artist_from_workers(&mut table, extract_artist)?;
    fill_artist_from_workers(&mut table, single_worker)?;
    fill_artist_from_workers(&mut table, extract_artists_before_semicolon)?;
    fill_artist_from_workers(&mut table, extract_roles_based_on_interest)?;

    table.drop_nulls(Some(&["artist"]))?;
    table.map_column("artist", |v| match v.as_str() {
        Some("(Various Artists)") => Value::from("Various Artists"),
        _ => v.clone(),
    })?;
    table.drop_columns(&["workers"])?;

    let (rows, cols) = table.shape();
    info!(
        "Transformation complete. The nominations dataset now has {} rows and {} columns.",
        rows, cols
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(rows: Vec<[Value; 10]>) -> Table {
        Table::from_rows(
            [
                "year", "title", "published_at", "updated_at", "category", "nominee", "artist",
                "workers", "img", "winner",
            ]
            .map(String::from)
            .to_vec(),
            rows.into_iter().map(|r| r.to_vec()).collect(),
        )
        .expect("raw nominations")
    }

    fn nomination(category: &str, nominee: Option<&str>, artist: Option<&str>, workers: Option<&str>) -> [Value; 10] {
        [
            Value::Int(2019),
            "62nd Annual GRAMMY Awards".into(),
            "2020-05-19T05:10:28-07:00".into(),
            "2020-05-19T05:10:28-07:00".into(),
            category.into(),
            nominee.into(),
            artist.into(),
            workers.into(),
            "https://img".into(),
            Value::Bool(true),
        ]
    }

    #[test]
    fn worker_rules() {
        assert_eq!(
            extract_artist("John Doe, producer (The Band)"),
            Some("The Band".to_string())
        );
        assert_eq!(extract_artist("no parens"), None);

        assert_eq!(single_worker("Solo Person"), Some("Solo Person".to_string()));
        assert_eq!(single_worker("A; B"), None);

        assert_eq!(
            extract_artists_before_semicolon(" Ensemble X ; Jane, producer"),
            Some("Ensemble X".to_string())
        );
        assert_eq!(extract_artists_before_semicolon("Jane, producer; X"), None);
        assert_eq!(extract_artists_before_semicolon("The Soloists Guild; X"), None);

        assert_eq!(
            extract_roles_based_on_interest("Jane Roe, Composer; Max Poe, conductor; Al, engineer"),
            Some("Jane Roe,  Max Poe".to_string())
        );
        assert_eq!(extract_roles_based_on_interest("Al, engineer"), None);
    }

    #[test]
    fn resolves_artists() -> Result<()> {
        let t = raw(vec![
            nomination("Song Of The Year", Some("Bad Guy"), Some("Billie Eilish"), None),
            nomination("Song Of The Year", None, Some("dropped: no nominee"), None),
            nomination("Best New Classical Artist", Some("Classical"), None, None),
            nomination("Album Of The Year", Some("Self Titled"), None, None),
            nomination("Record Of The Year", Some("Paren"), None, Some("Jo, producer (The Group)")),
            nomination("Best Dance Recording", Some("Single"), None, Some("DJ Someone")),
            nomination("Best Opera Recording", Some("First"), None, Some("Choir One; Jo, engineer")),
            nomination("Best Opera Recording", Some("Roles"), None, Some("Ann, conductor; Jo, engineer")),
            nomination("Best Opera Recording", Some("Nothing"), None, Some("Jo, engineer; Al, mixer")),
            nomination("Best Compilation", Some("Various"), Some("(Various Artists)"), None),
        ]);

        let out = transform_nominations(t)?;
        assert_eq!(
            out.columns(),
            &["year", "title", "category", "nominee", "artist", "is_nominated"].map(String::from)
        );

        let pairs: Vec<(String, String)> = out
            .rows()
            .iter()
            .map(|r| (r[3].to_string(), r[4].to_string()))
            .collect();
        let expected = [
            ("Bad Guy", "Billie Eilish"),
            ("Self Titled", "Self Titled"),
            ("Paren", "The Group"),
            ("Single", "DJ Someone"),
            ("First", "Choir One"),
            ("Roles", "Ann"),
            ("Various", "Various Artists"),
        ]
        .map(|(a, b)| (a.to_string(), b.to_string()));
        assert_eq!(pairs, expected.to_vec());
        Ok(())
    }

    #[test]
    fn requires_raw_columns() {
        let t = Table::from_rows(vec!["nominee".into()], vec![vec!["x".into()]]).expect("table");
        assert!(transform_nominations(t).is_err());
    }
}
