use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{
    join_labels, merge_labels, now_timestamp, split_labels, timestamp, Post, PostView, UserSummary,
};
use crate::feed::FeedQuery;

pub struct NewPost<'a> {
    pub user_id: &'a str,
    pub url: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub og_image: &'a str,
    pub tags: &'a str,
    pub categories: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Owner edits. `None` leaves the column as it is.
#[derive(Debug, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub categories: Option<String>,
}

const POST_COLUMNS: &str = "id, user_id, url, title, description, og_image, tags, categories, \
                            ai_summary, view_count, created_at, updated_at";

/// `?1` is the viewer id ("" when anonymous).
const VIEW_SELECT: &str = "SELECT p.id, p.url, p.title, p.description, p.og_image, p.tags,
        p.categories, p.ai_summary, p.view_count, p.created_at, p.updated_at,
        u.id, u.username, u.display_name, u.image,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id) AS reaction_count,
        EXISTS (SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = ?1) AS bookmarked,
        (SELECT r.type FROM reactions r WHERE r.post_id = p.id AND r.user_id = ?1) AS viewer_reaction
     FROM posts p
     JOIN users u ON u.id = p.user_id";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        og_image: row.get(5)?,
        tags: row.get(6)?,
        categories: row.get(7)?,
        ai_summary: row.get(8)?,
        view_count: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_view(row: &Row<'_>) -> rusqlite::Result<PostView> {
    let tags: String = row.get(5)?;
    let categories: String = row.get(6)?;
    let viewer_reaction: Option<String> = row.get(18)?;

    Ok(PostView {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        og_image: row.get(4)?,
        tags: split_labels(&tags),
        categories: split_labels(&categories),
        ai_summary: row.get(7)?,
        view_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        user: UserSummary {
            id: row.get(11)?,
            username: row.get(12)?,
            display_name: row.get(13)?,
            image: row.get(14)?,
        },
        comment_count: row.get(15)?,
        reaction_count: row.get(16)?,
        bookmarked: row.get(17)?,
        viewer_reaction: viewer_reaction.and_then(|kind| kind.parse().ok()),
    })
}

pub fn insert(conn: &Connection, new: &NewPost<'_>) -> rusqlite::Result<Post> {
    let id = uuid::Uuid::now_v7().to_string();
    let created_at = timestamp(new.created_at);

    conn.execute(
        "INSERT INTO posts (id, user_id, url, title, description, og_image, tags, categories, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            id,
            new.user_id,
            new.url,
            new.title,
            new.description,
            new.og_image,
            new.tags,
            new.categories,
            created_at,
        ],
    )?;

    Ok(Post {
        id,
        user_id: new.user_id.to_string(),
        url: new.url.to_string(),
        title: new.title.to_string(),
        description: new.description.to_string(),
        og_image: new.og_image.to_string(),
        tags: new.tags.to_string(),
        categories: new.categories.to_string(),
        ai_summary: None,
        view_count: 0,
        created_at: created_at.clone(),
        updated_at: created_at,
    })
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![id],
        map_post,
    )
    .optional()
}

pub fn exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM posts WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

pub fn view(conn: &Connection, id: &str, viewer: Option<&str>) -> rusqlite::Result<Option<PostView>> {
    conn.query_row(
        &format!("{VIEW_SELECT} WHERE p.id = ?2"),
        params![viewer.unwrap_or(""), id],
        map_view,
    )
    .optional()
}

pub fn list_feed(
    conn: &Connection,
    query: &FeedQuery,
    viewer: Option<&str>,
) -> rusqlite::Result<Vec<PostView>> {
    let mut values = vec![Value::Text(viewer.unwrap_or("").to_string())];
    let where_sql = query.where_sql(&mut values);

    values.push(Value::Integer(i64::from(query.take)));
    let limit_idx = values.len();
    values.push(Value::Integer(i64::from(query.skip)));
    let offset_idx = values.len();

    let sql = format!(
        "{VIEW_SELECT} WHERE {where_sql} ORDER BY {} LIMIT ?{limit_idx} OFFSET ?{offset_idx}",
        query.sort.order_sql()
    );

    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params_from_iter(values.iter()), map_view)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Returns false when the post does not exist.
pub fn update(conn: &Connection, id: &str, changes: &PostUpdate) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE posts SET
            title = COALESCE(?2, title),
            description = COALESCE(?3, description),
            tags = COALESCE(?4, tags),
            categories = COALESCE(?5, categories),
            updated_at = ?6
         WHERE id = ?1",
        params![
            id,
            changes.title,
            changes.description,
            changes.tags,
            changes.categories,
            now_timestamp(),
        ],
    )?;
    Ok(rows > 0)
}

/// Comments, reactions, bookmarks and the enrichment job go with it.
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Bump the view counter; `None` when the post does not exist.
pub fn increment_views(conn: &Connection, id: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "UPDATE posts SET view_count = view_count + 1 WHERE id = ?1 RETURNING view_count",
        params![id],
        |row| row.get(0),
    )
    .optional()
}

/// Write enrichment output. New tags are merged into the tags stored at
/// write time, so edits made while enrichment ran are kept. An empty
/// summary or tag list leaves that field untouched. `false` when the post
/// no longer exists.
pub fn apply_enrichment(
    conn: &mut Connection,
    id: &str,
    summary: Option<&str>,
    new_tags: &[String],
) -> rusqlite::Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let stored: Option<String> = tx
        .query_row("SELECT tags FROM posts WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    let Some(stored) = stored else {
        return Ok(false);
    };

    let summary = summary.filter(|s| !s.is_empty());
    let tags = (!new_tags.is_empty()).then(|| join_labels(&merge_labels(&stored, new_tags)));
    tx.execute(
        "UPDATE posts SET
            ai_summary = COALESCE(?2, ai_summary),
            tags = COALESCE(?3, tags),
            updated_at = ?4
         WHERE id = ?1",
        params![id, summary, tags, now_timestamp()],
    )?;
    tx.commit()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::db::models::ReactionType;
    use crate::db::test_support::{insert_user, migrated_pool};
    use crate::db::{bookmarks, comments, reactions};
    use crate::feed::FeedParams;
    use chrono::Duration;

    fn seed_post(
        conn: &Connection,
        user_id: &str,
        title: &str,
        tags: &str,
        categories: &str,
        created_at: DateTime<Utc>,
    ) -> Post {
        insert(
            conn,
            &NewPost {
                user_id,
                url: "https://example.com/article",
                title,
                description: "",
                og_image: "",
                tags,
                categories,
                created_at,
            },
        )
        .unwrap()
    }

    fn feed(conn: &Connection, params: FeedParams, viewer: Option<&str>, now: DateTime<Utc>) -> Vec<String> {
        let query = FeedQuery::build(&params, viewer, now, &FeedConfig::default());
        list_feed(conn, &query, viewer)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect()
    }

    #[test]
    fn insert_and_view_roundtrip_counts() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        let post = seed_post(&conn, &alice, "Hello", "example.com", "backend,devops", Utc::now());

        comments::insert(&conn, &post.id, &bob, "nice").unwrap();
        reactions::react(&conn, &post.id, &bob, ReactionType::Fire).unwrap();
        bookmarks::toggle(&conn, &post.id, &bob).unwrap();

        let as_bob = view(&conn, &post.id, Some(&bob)).unwrap().unwrap();
        assert_eq!(as_bob.user.username, "alice");
        assert_eq!(as_bob.categories, vec!["backend", "devops"]);
        assert_eq!(as_bob.comment_count, 1);
        assert_eq!(as_bob.reaction_count, 1);
        assert!(as_bob.bookmarked);
        assert_eq!(as_bob.viewer_reaction, Some(ReactionType::Fire));

        let anonymous = view(&conn, &post.id, None).unwrap().unwrap();
        assert!(!anonymous.bookmarked);
        assert_eq!(anonymous.viewer_reaction, None);
    }

    #[test]
    fn search_is_text_and_category() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let now = Utc::now();

        seed_post(&conn, &user, "database tuning", "", "백엔드", now);
        seed_post(&conn, &user, "database styling", "", "프론트엔드", now);
        seed_post(&conn, &user, "api gateways", "", "백엔드", now);

        let titles = feed(
            &conn,
            FeedParams {
                q: Some("database @백엔드".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(titles, vec!["database tuning"]);
    }

    #[test]
    fn text_search_covers_tags_and_is_case_sensitive() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let now = Utc::now();

        seed_post(&conn, &user, "First", "github.com,Rust", "", now);
        seed_post(&conn, &user, "Second", "rust-lang.org", "", now);

        let titles = feed(
            &conn,
            FeedParams {
                q: Some("Rust".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(titles, vec!["First"]);
    }

    #[test]
    fn period_excludes_older_posts() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let now = Utc::now();

        seed_post(&conn, &user, "eight days", "", "", now - Duration::days(8));
        seed_post(&conn, &user, "six days", "", "", now - Duration::days(6));

        let titles = feed(
            &conn,
            FeedParams {
                period: Some("7days".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(titles, vec!["six days"]);
    }

    #[test]
    fn sorts_by_latest_views_and_reactions() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        let now = Utc::now();

        let old = seed_post(&conn, &alice, "old", "", "", now - Duration::days(2));
        let mid = seed_post(&conn, &alice, "mid", "", "", now - Duration::days(1));
        seed_post(&conn, &alice, "new", "", "", now);

        for _ in 0..3 {
            increment_views(&conn, &mid.id).unwrap();
        }
        increment_views(&conn, &old.id).unwrap();

        reactions::react(&conn, &old.id, &alice, ReactionType::Idea).unwrap();
        reactions::react(&conn, &old.id, &bob, ReactionType::Laugh).unwrap();
        reactions::react(&conn, &mid.id, &bob, ReactionType::Fire).unwrap();

        let latest = feed(&conn, FeedParams::default(), None, now);
        assert_eq!(latest, vec!["new", "mid", "old"]);

        let views = feed(
            &conn,
            FeedParams {
                sort: Some("views".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(views, vec!["mid", "old", "new"]);

        let by_reactions = feed(
            &conn,
            FeedParams {
                sort: Some("reactions".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(by_reactions, vec!["old", "mid", "new"]);
    }

    #[test]
    fn paging_and_bookmark_filter() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            let post = seed_post(
                &conn,
                &alice,
                &format!("post {i}"),
                "",
                "",
                now - Duration::minutes(i),
            );
            ids.push(post.id);
        }
        bookmarks::toggle(&conn, &ids[3], &alice).unwrap();

        let page = feed(
            &conn,
            FeedParams {
                take: Some("2".into()),
                skip: Some("1".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(page, vec!["post 1", "post 2"]);

        let saved = feed(
            &conn,
            FeedParams {
                filter: Some("bookmarked".into()),
                ..Default::default()
            },
            Some(&alice),
            now,
        );
        assert_eq!(saved, vec!["post 3"]);

        let anonymous = feed(
            &conn,
            FeedParams {
                filter: Some("bookmarked".into()),
                ..Default::default()
            },
            None,
            now,
        );
        assert_eq!(anonymous.len(), 5);
    }

    #[test]
    fn update_only_touches_given_fields() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let post = seed_post(&conn, &user, "Before", "a,b", "x", Utc::now());

        let changed = update(
            &conn,
            &post.id,
            &PostUpdate {
                title: Some("After".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(changed);

        let stored = get(&conn, &post.id).unwrap().unwrap();
        assert_eq!(stored.title, "After");
        assert_eq!(stored.tags, "a,b");
        assert_eq!(stored.categories, "x");

        assert!(!update(&conn, "missing", &PostUpdate::default()).unwrap());
    }

    #[test]
    fn delete_cascades_to_dependents() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice");
        let bob = insert_user(&conn, "bob");
        let post = seed_post(&conn, &alice, "Doomed", "", "", Utc::now());

        comments::insert(&conn, &post.id, &bob, "first").unwrap();
        reactions::react(&conn, &post.id, &bob, ReactionType::ThumbsUp).unwrap();
        bookmarks::toggle(&conn, &post.id, &bob).unwrap();
        crate::db::jobs::mark(&conn, &post.id, crate::db::jobs::JobStatus::Pending, None, None)
            .unwrap();

        assert!(delete(&conn, &post.id).unwrap());

        for table in ["comments", "reactions", "bookmarks", "enrichment_jobs"] {
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE post_id = ?1"),
                    params![post.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0, "orphaned rows in {table}");
        }
        assert!(!delete(&conn, &post.id).unwrap());
    }

    #[test]
    fn increment_views_counts_and_reports_missing() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let post = seed_post(&conn, &user, "Viewed", "", "", Utc::now());

        assert_eq!(increment_views(&conn, &post.id).unwrap(), Some(1));
        assert_eq!(increment_views(&conn, &post.id).unwrap(), Some(2));
        assert_eq!(increment_views(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn apply_enrichment_keeps_unset_fields() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let post = seed_post(&conn, &user, "Enrich me", "example.com", "", Utc::now());

        assert!(apply_enrichment(&mut conn, &post.id, Some("A summary."), &[]).unwrap());
        let stored = get(&conn, &post.id).unwrap().unwrap();
        assert_eq!(stored.ai_summary.as_deref(), Some("A summary."));
        assert_eq!(stored.tags, "example.com");
    }

    #[test]
    fn apply_enrichment_merges_into_current_tags() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice");
        let post = seed_post(&conn, &user, "Enrich me", "example.com", "", Utc::now());

        // Owner replaces the tags after enrichment read the post
        let edit = PostUpdate {
            tags: Some("edited,rust".to_string()),
            ..Default::default()
        };
        update(&conn, &post.id, &edit).unwrap();

        let new_tags = vec!["rust".to_string(), "async".to_string()];
        assert!(apply_enrichment(&mut conn, &post.id, None, &new_tags).unwrap());
        let stored = get(&conn, &post.id).unwrap().unwrap();
        assert_eq!(stored.tags, "edited,rust,async");
        assert_eq!(stored.ai_summary, None);
    }

    #[test]
    fn apply_enrichment_reports_missing_post() {
        let pool = migrated_pool();
        let mut conn = pool.get().unwrap();
        let tags = vec!["rust".to_string()];
        assert!(!apply_enrichment(&mut conn, "missing", Some("s"), &tags).unwrap());
    }
}
