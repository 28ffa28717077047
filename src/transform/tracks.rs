use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument};

use crate::table::{cell, Table, Value};

/// Genre → category. Genres missing from this table map to null.
static GENRE_CATEGORIES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let groups: &[(&str, &[&str])] = &[
        (
            "Rock/Metal",
            &[
                "alt-rock", "alternative", "black-metal", "death-metal", "emo", "grindcore",
                "hard-rock", "hardcore", "heavy-metal", "metal", "metalcore", "psych-rock",
                "punk-rock", "punk", "rock-n-roll", "rock", "grunge", "j-rock", "goth",
                "industrial", "rockabilly", "indie",
            ],
        ),
        (
            "Pop",
            &[
                "pop", "indie-pop", "power-pop", "k-pop", "j-pop", "mandopop", "cantopop",
                "pop-film", "j-idol", "synth-pop",
            ],
        ),
        (
            "Electronic/Dance",
            &[
                "edm", "electro", "electronic", "house", "deep-house", "progressive-house",
                "techno", "trance", "dubstep", "drum-and-bass", "dub", "garage", "idm", "club",
                "dance", "minimal-techno", "detroit-techno", "chicago-house", "breakbeat",
                "hardstyle", "j-dance", "trip-hop",
            ],
        ),
        ("Urban", &["hip-hop", "r-n-b", "dancehall", "reggaeton", "reggae"]),
        (
            "Latino",
            &[
                "brazil", "salsa", "samba", "spanish", "pagode", "sertanejo", "mpb", "latin",
                "latino",
            ],
        ),
        (
            "Global Sounds",
            &[
                "indian", "iranian", "malay", "turkish", "tango", "afrobeat", "french", "german",
                "british", "swedish",
            ],
        ),
        (
            "Jazz and Soul",
            &["blues", "bluegrass", "funk", "gospel", "jazz", "soul", "groove", "disco", "ska"],
        ),
        (
            "Varied Themes",
            &[
                "children", "disney", "forro", "kids", "party", "romance", "show-tunes", "comedy",
                "anime",
            ],
        ),
        (
            "Instrumental",
            &["acoustic", "classical", "guitar", "piano", "world-music", "opera", "new-age"],
        ),
        ("Mood", &["ambient", "chill", "happy", "sad", "sleep", "study"]),
        ("Single Genre", &["country", "honky-tonk", "folk", "singer-songwriter"]),
    ];
    groups
        .iter()
        .flat_map(|(category, genres)| genres.iter().map(move |g| (*g, *category)))
        .collect()
});

/// Feature columns not carried past the transform.
const DROPPED_FEATURES: &[&str] = &[
    "loudness",
    "mode",
    "duration_ms",
    "key",
    "tempo",
    "valence",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "time_signature",
];

pub fn genre_category(genre: &str) -> Option<&'static str> {
    GENRE_CATEGORIES.get(genre).copied()
}

pub fn categorize_duration(duration_ms: f64) -> &'static str {
    if duration_ms < 150_000.0 {
        "Short"
    } else if duration_ms <= 300_000.0 {
        "Average"
    } else {
        "Long"
    }
}

pub fn categorize_popularity(popularity: f64) -> &'static str {
    if popularity <= 30.0 {
        "Low Popularity"
    } else if popularity <= 70.0 {
        "Average Popularity"
    } else {
        "High Popularity"
    }
}

/// Valence bins; scores between 0.3 and 0.31 fall through to "Happy".
pub fn determine_mood(valence: f64) -> &'static str {
    if valence <= 0.3 {
        "Sad"
    } else if (0.31..=0.6).contains(&valence) {
        "Neutral"
    } else {
        "Happy"
    }
}

fn number(row: &[Value], lookup: &HashMap<&str, usize>, name: &str) -> Result<f64> {
    let v = cell(row, lookup, name)?;
    v.as_f64()
        .with_context(|| format!("`{}` is not numeric: {:?}", name, v))
}

/// Per (track_name, artists) group keep the most popular row; earlier rows win ties.
fn keep_most_popular(table: &mut Table) -> Result<()> {
    let name_idx = table.column_index("track_name")?;
    let artists_idx = table.column_index("artists")?;
    let pop_idx = table.column_index("popularity")?;

    let mut best: HashMap<(String, String), (usize, f64)> = HashMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        let key = (row[name_idx].to_string(), row[artists_idx].to_string());
        let pop = row[pop_idx].as_f64().unwrap_or(f64::NEG_INFINITY);
        match best.get(&key) {
            Some(&(_, p)) if p >= pop => {}
            _ => {
                best.insert(key, (i, pop));
            }
        }
    }

    let keep: HashSet<usize> = best.values().map(|(i, _)| *i).collect();
    let mut idx = 0;
    table.retain_rows(|_| {
        let k = keep.contains(&idx);
        idx += 1;
        k
    });
    Ok(())
}

/// Clean the tracks dataset and derive its categorical columns.
#[instrument(level = "info", skip(table))]
pub fn transform_tracks(mut table: Table) -> Result<Table> {
    let (rows, cols) = table.shape();
    info!(
        "Cleaning and transforming the tracks dataset: {} rows and {} columns.",
        rows, cols
    );

    table.drop_columns_if_present(&["Unnamed: 0"]);

    table.drop_nulls(None)?;
    table.drop_duplicates(None)?;
    table.drop_duplicates(Some(&["track_id"]))?;

    table.map_column("track_genre", |v| match v {
        Value::Text(g) => genre_category(g).map(Value::from).unwrap_or(Value::Null),
        _ => Value::Null,
    })?;

    table.drop_duplicates_except(&["track_id", "album_name"])?;
    keep_most_popular(&mut table)?;

    table.add_column("duration_min", |row, lk| {
        let ms = cell(row, lk, "duration_ms")?
            .as_i64()
            .context("`duration_ms` is not an integer")?;
        Ok(Value::Int(ms.div_euclid(60_000)))
    })?;
    table.add_column("duration_category", |row, lk| {
        Ok(categorize_duration(number(row, lk, "duration_ms")?).into())
    })?;
    table.add_column("popularity_category", |row, lk| {
        Ok(categorize_popularity(number(row, lk, "popularity")?).into())
    })?;
    table.add_column("track_mood", |row, lk| {
        Ok(determine_mood(number(row, lk, "valence")?).into())
    })?;
    table.add_column("live_performance", |row, lk| {
        Ok(Value::Bool(number(row, lk, "liveness")? > 0.8))
    })?;

    table.drop_columns(DROPPED_FEATURES)?;

    let (rows, cols) = table.shape();
    info!(
        "The tracks dataset has been cleaned and transformed: {} rows and {} columns.",
        rows, cols
    );
    Ok(table)
}
