use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "book_status", rename_all = "PascalCase")]
pub enum BookStatus {
    Available,
    Borrowed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub birthdate: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: Uuid,
    pub isbn: String,
    pub title: String,
    pub published_date: Option<OffsetDateTime>,
    pub author_id: Uuid,
    pub status: BookStatus,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BorrowRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_at: OffsetDateTime,
    pub due_at: OffsetDateTime,
    pub returned_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl Author {
    pub async fn list(db: &PgPool) -> Result<Vec<Author>, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, bio, birthdate, created_at FROM authors ORDER BY name",
        )
        .fetch_all(db)
        .await
    }

    pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Author>, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            "SELECT id, name, bio, birthdate, created_at FROM authors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn create(
        db: &PgPool,
        name: &str,
        bio: Option<&str>,
        birthdate: Option<OffsetDateTime>,
    ) -> Result<Author, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name, bio, birthdate)
             VALUES ($1, $2, $3)
             RETURNING id, name, bio, birthdate, created_at",
        )
        .bind(name)
        .bind(bio)
        .bind(birthdate)
        .fetch_one(db)
        .await
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        bio: Option<&str>,
        birthdate: Option<OffsetDateTime>,
    ) -> Result<Option<Author>, sqlx::Error> {
        sqlx::query_as::<_, Author>(
            "UPDATE authors SET
                 name = COALESCE($2, name),
                 bio = COALESCE($3, bio),
                 birthdate = COALESCE($4, birthdate)
             WHERE id = $1
             RETURNING id, name, bio, birthdate, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(bio)
        .bind(birthdate)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const BOOK_COLUMNS: &str = "id, isbn, title, published_date, author_id, status, created_at";

impl Book {
    pub async fn list(db: &PgPool) -> Result<Vec<Book>, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY title"))
            .fetch_all(db)
            .await
    }

    pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<Book>, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn create(
        db: &PgPool,
        isbn: &str,
        title: &str,
        published_date: Option<OffsetDateTime>,
        author_id: Uuid,
    ) -> Result<Book, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books (isbn, title, published_date, author_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(isbn)
        .bind(title)
        .bind(published_date)
        .bind(author_id)
        .fetch_one(db)
        .await
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        title: Option<&str>,
        published_date: Option<OffsetDateTime>,
    ) -> Result<Option<Book>, sqlx::Error> {
        sqlx::query_as::<_, Book>(&format!(
            "UPDATE books SET
                 title = COALESCE($2, title),
                 published_date = COALESCE($3, published_date)
             WHERE id = $1
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(id)
        .bind(title)
        .bind(published_date)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

const BORROW_COLUMNS: &str =
    "id, user_id, book_id, borrowed_at, due_at, returned_at, created_at";

impl BorrowRecord {
    pub async fn list_all(db: &PgPool) -> Result<Vec<BorrowRecord>, sqlx::Error> {
        sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records ORDER BY borrowed_at DESC"
        ))
        .fetch_all(db)
        .await
    }

    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> Result<Vec<BorrowRecord>, sqlx::Error> {
        sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records
             WHERE user_id = $1 ORDER BY borrowed_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    pub async fn find(db: &PgPool, id: Uuid) -> Result<Option<BorrowRecord>, sqlx::Error> {
        sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {BORROW_COLUMNS} FROM borrow_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Open a borrow record and flip the book to `Borrowed` in one
    /// transaction. Returns `None` when the book does not exist or is not
    /// available.
    pub async fn borrow(
        db: &PgPool,
        user_id: Uuid,
        book_id: Uuid,
        due_at: OffsetDateTime,
    ) -> Result<Option<BorrowRecord>, sqlx::Error> {
        let mut tx = db.begin().await?;

        let updated = sqlx::query(
            "UPDATE books SET status = 'Borrowed'
             WHERE id = $1 AND status = 'Available'",
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            "INSERT INTO borrow_records (user_id, book_id, due_at)
             VALUES ($1, $2, $3)
             RETURNING {BORROW_COLUMNS}"
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(due_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }

    /// Close an open borrow record and flip the book back to `Available`.
    pub async fn finish(db: &PgPool, id: Uuid) -> Result<Option<BorrowRecord>, sqlx::Error> {
        let mut tx = db.begin().await?;

        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            "UPDATE borrow_records SET returned_at = now()
             WHERE id = $1 AND returned_at IS NULL
             RETURNING {BORROW_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE books SET status = 'Available' WHERE id = $1")
            .bind(record.book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(record))
    }
}
