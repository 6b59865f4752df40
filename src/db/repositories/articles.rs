use anyhow::{anyhow, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_article_status, parse_datetime, parse_optional_datetime},
    Database,
};
use crate::models::{Article, Category};

const ARTICLE_COLUMNS: &str = "id, title, slug, excerpt, content, cover_url, category_id, \
     author, status, read_minutes, published_at, created_at, updated_at";

fn row_to_article(row: &Row) -> Result<Article> {
    let status: String = row.get("status")?;
    let read_minutes: i64 = row.get("read_minutes")?;
    let published_at: Option<String> = row.get("published_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Article {
        id: row.get("id")?,
        title: row.get("title")?,
        slug: row.get("slug")?,
        excerpt: row.get("excerpt")?,
        content: row.get("content")?,
        cover_url: row.get("cover_url")?,
        category_id: row.get("category_id")?,
        author: row.get("author")?,
        status: parse_article_status(&status)?,
        read_minutes: u32::try_from(read_minutes)
            .map_err(|_| anyhow!("read_minutes out of range: {read_minutes}"))?,
        published_at: parse_optional_datetime(published_at, "published_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_article(&self, article: &Article) -> Result<()> {
        let record = article.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO articles (id, title, slug, excerpt, content, cover_url, category_id,
                                       author, status, read_minutes, published_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.id,
                    record.title,
                    record.slug,
                    record.excerpt,
                    record.content,
                    record.cover_url,
                    record.category_id,
                    record.author,
                    record.status.as_str(),
                    i64::from(record.read_minutes),
                    record.published_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_article(&self, article_id: &str) -> Result<Option<Article>> {
        let article_id = article_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?1"
            ))?;
            let row = stmt
                .query_row(params![article_id], |row| Ok(row_to_article(row)))
                .optional()?;
            row.transpose()
        })
        .await
    }

    pub async fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let slug = slug.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = ?1"
            ))?;
            let row = stmt
                .query_row(params![slug], |row| Ok(row_to_article(row)))
                .optional()?;
            row.transpose()
        })
        .await
    }

    pub async fn list_published_articles(&self) -> Result<Vec<Article>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles
                 WHERE status = 'published'
                 ORDER BY published_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut articles = Vec::new();
            while let Some(row) = rows.next()? {
                articles.push(row_to_article(row)?);
            }

            Ok(articles)
        })
        .await
    }

    pub async fn insert_category(&self, category: &Category) -> Result<()> {
        let record = category.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO categories (id, name, description) VALUES (?1, ?2, ?3)",
                params![record.id, record.name, record.description],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description FROM categories ORDER BY name ASC")?;

            let mut rows = stmt.query([])?;
            let mut categories = Vec::new();
            while let Some(row) = rows.next()? {
                categories.push(Category {
                    id: row.get("id")?,
                    name: row.get("name")?,
                    description: row.get("description")?,
                });
            }

            Ok(categories)
        })
        .await
    }
}
