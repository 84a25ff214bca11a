use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::dates;

pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS user (
            name          TEXT PRIMARY KEY NOT NULL,
            last_online   TEXT,
            gender        TEXT,
            birthday      TEXT,
            joined        TEXT,
            location      TEXT,
            shared        INTEGER,
            affinity      REAL,
            friend_count  INTEGER,
            days          REAL,
            mean_score    REAL,
            completed     INTEGER
        );

        CREATE TABLE IF NOT EXISTS favorite (
            name  TEXT NOT NULL,
            type  TEXT NOT NULL,
            user  TEXT NOT NULL REFERENCES user(name)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_favorite_unique ON favorite(name, type, user);
        CREATE INDEX IF NOT EXISTS idx_favorite_user ON favorite(user);
        ",
    )?;
    Ok(())
}

// ── Records ──

/// One scraped profile. Every field except `favorites` may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserRow {
    pub name: Option<String>,
    pub last_online: Option<NaiveDateTime>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub joined: Option<NaiveDate>,
    pub location: Option<String>,
    pub shared: Option<i64>,
    pub affinity: Option<f64>,
    pub friend_count: Option<i64>,
    pub days: Option<f64>,
    pub mean_score: Option<f64>,
    pub completed: Option<i64>,
    pub favorites: Favorites,
}

impl UserRow {
    /// The natural key, if the page yielded a usable one.
    pub fn key(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Favorites {
    pub anime: Vec<String>,
    pub manga: Vec<String>,
    pub character: Vec<String>,
    pub people: Vec<String>,
}

impl Favorites {
    pub fn by_kind(&self) -> [(FavoriteKind, &[String]); 4] {
        [
            (FavoriteKind::Anime, self.anime.as_slice()),
            (FavoriteKind::Manga, self.manga.as_slice()),
            (FavoriteKind::Character, self.character.as_slice()),
            (FavoriteKind::People, self.people.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteKind {
    Anime,
    Manga,
    Character,
    People,
}

impl FavoriteKind {
    pub const ALL: [FavoriteKind; 4] = [
        FavoriteKind::Anime,
        FavoriteKind::Manga,
        FavoriteKind::Character,
        FavoriteKind::People,
    ];

    /// Tag stored in `favorite.type`.
    pub fn as_str(self) -> &'static str {
        match self {
            FavoriteKind::Anime => "anime",
            FavoriteKind::Manga => "manga",
            FavoriteKind::Character => "character",
            FavoriteKind::People => "people",
        }
    }
}

// ── Writes ──

/// Upsert a batch in one transaction. User rows are overwritten on name
/// conflict; favorites are only ever added. Records without a name are
/// skipped. Returns the number of user rows written.
pub fn save_users(conn: &Connection, users: &[UserRow]) -> Result<usize> {
    init_schema(conn)?;
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut u_stmt = tx.prepare(
            "INSERT INTO user
             (name, last_online, gender, birthday, joined, location, shared,
              affinity, friend_count, days, mean_score, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(name) DO UPDATE SET
                last_online = excluded.last_online,
                gender = excluded.gender,
                birthday = excluded.birthday,
                joined = excluded.joined,
                location = excluded.location,
                shared = excluded.shared,
                affinity = excluded.affinity,
                friend_count = excluded.friend_count,
                days = excluded.days,
                mean_score = excluded.mean_score,
                completed = excluded.completed",
        )?;
        let mut f_stmt =
            tx.prepare("INSERT OR IGNORE INTO favorite (name, type, user) VALUES (?1, ?2, ?3)")?;

        for u in users {
            let Some(name) = u.key() else { continue };
            count += u_stmt.execute(rusqlite::params![
                name,
                dates::last_online_text(u.last_online),
                u.gender,
                dates::date_text(u.birthday),
                dates::date_text(u.joined),
                u.location,
                u.shared,
                u.affinity,
                u.friend_count,
                u.days,
                u.mean_score,
                u.completed,
            ])?;
            for (kind, names) in u.favorites.by_kind() {
                for fav in names {
                    f_stmt.execute(rusqlite::params![fav, kind.as_str(), name])?;
                }
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Stats ──

pub struct Stats {
    pub users: usize,
    pub with_affinity: usize,
    /// Favorite counts in [`FavoriteKind::ALL`] order.
    pub favorites: Vec<(FavoriteKind, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let users: usize = conn.query_row("SELECT COUNT(*) FROM user", [], |r| r.get(0))?;
    let with_affinity: usize = conn.query_row(
        "SELECT COUNT(*) FROM user WHERE affinity IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM favorite WHERE type = ?1")?;
    let favorites = FavoriteKind::ALL
        .iter()
        .map(|kind| -> rusqlite::Result<(FavoriteKind, usize)> {
            let n: usize = stmt.query_row([kind.as_str()], |r| r.get(0))?;
            Ok((*kind, n))
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Stats {
        users,
        with_affinity,
        favorites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn user(name: &str) -> UserRow {
        UserRow {
            name: Some(name.to_string()),
            gender: Some("Male".into()),
            location: Some("Berlin".into()),
            shared: Some(12),
            affinity: Some(-4.5),
            birthday: NaiveDate::from_ymd_opt(1990, 5, 17),
            favorites: Favorites {
                anime: vec!["Monster".into(), "Mushishi".into()],
                people: vec!["Kon, Satoshi".into()],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn nameless_records_never_reach_the_store() {
        let conn = mem();
        let mut blank = user("x");
        blank.name = Some("  ".into());
        let mut missing = user("y");
        missing.name = None;
        let written = save_users(&conn, &[blank, missing, user("kept")]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM user"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM favorite WHERE user != 'kept'"), 0);
    }

    #[test]
    fn favorite_reingestion_keeps_one_row() {
        let conn = mem();
        save_users(&conn, &[user("alice")]).unwrap();
        save_users(&conn, &[user("alice")]).unwrap();
        assert_eq!(
            count(
                &conn,
                "SELECT COUNT(*) FROM favorite WHERE name = 'Monster' AND type = 'anime' AND user = 'alice'"
            ),
            1
        );
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM favorite"), 3);
    }

    #[test]
    fn same_name_in_two_categories_is_two_rows() {
        let conn = mem();
        let mut u = user("bob");
        u.favorites.manga = vec!["Monster".into()];
        save_users(&conn, &[u]).unwrap();
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM favorite WHERE name = 'Monster' AND user = 'bob'"),
            2
        );
    }

    #[test]
    fn rescrape_overwrites_scalars_but_keeps_old_favorites() {
        let conn = mem();
        save_users(&conn, &[user("carol")]).unwrap();

        let mut again = user("carol");
        again.location = None;
        again.shared = Some(99);
        again.affinity = None;
        again.favorites = Favorites {
            manga: vec!["Vagabond".into()],
            ..Default::default()
        };
        save_users(&conn, &[again]).unwrap();

        let (location, shared, affinity, birthday): (Option<String>, i64, Option<f64>, String) = conn
            .query_row(
                "SELECT location, shared, affinity, birthday FROM user WHERE name = 'carol'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(location, None);
        assert_eq!(shared, 99);
        assert_eq!(affinity, None);
        assert_eq!(birthday, "1990-05-17");
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM user"), 1);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM favorite WHERE user = 'carol'"), 4);
    }

    #[test]
    fn save_creates_schema_on_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connect(&dir.path().join("users.db")).unwrap();
        assert_eq!(save_users(&conn, &[user("dave")]).unwrap(), 1);
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.with_affinity, 1);
        assert_eq!(
            stats.favorites,
            vec![
                (FavoriteKind::Anime, 2),
                (FavoriteKind::Manga, 0),
                (FavoriteKind::Character, 0),
                (FavoriteKind::People, 1),
            ]
        );
    }
}
