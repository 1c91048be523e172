use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::AuthUser,
        repo::{Role, User},
    },
    error::ApiError,
    state::AppState,
};

use super::dto::{
    BorrowRequest, CreateAuthorRequest, CreateBookRequest, UpdateAuthorRequest, UpdateBookRequest,
};
use super::repo::{Author, Book, BorrowRecord};

const DEFAULT_LOAN_DAYS: i64 = 14;

pub fn library_routes() -> Router<AppState> {
    Router::new()
        .route("/authors", get(list_authors).post(create_author))
        .route(
            "/authors/:id",
            get(get_author).patch(update_author).delete(delete_author),
        )
        .route("/books", get(list_books).post(create_book))
        .route(
            "/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .route("/books/:id/borrow", post(borrow_book))
        .route("/borrows", get(list_borrows))
        .route("/borrows/:id/return", post(return_book))
}

/// Catalogue writes are restricted to staff roles.
fn require_staff(user: &User) -> Result<(), ApiError> {
    match user.role {
        Role::Admin | Role::Librarian => Ok(()),
        Role::Member => Err(ApiError::Forbidden),
    }
}

// --- authors ---

#[instrument(skip(state))]
async fn list_authors(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<Author>>, ApiError> {
    Ok(Json(Author::list(&state.db).await?))
}

#[instrument(skip(state))]
async fn get_author(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Author>, ApiError> {
    let author = Author::find(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Author"))?;
    Ok(Json(author))
}

#[instrument(skip(state, payload))]
async fn create_author(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateAuthorRequest>,
) -> Result<(StatusCode, Json<Author>), ApiError> {
    require_staff(&user)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Please provide an author name".into()));
    }
    let author = Author::create(&state.db, name, payload.bio.as_deref(), payload.birthdate).await?;
    info!(author_id = %author.id, "author created");
    Ok((StatusCode::CREATED, Json(author)))
}

#[instrument(skip(state, payload))]
async fn update_author(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAuthorRequest>,
) -> Result<Json<Author>, ApiError> {
    require_staff(&user)?;
    let author = Author::update(
        &state.db,
        id,
        payload.name.as_deref(),
        payload.bio.as_deref(),
        payload.birthdate,
    )
    .await?
    .ok_or(ApiError::NotFound("Author"))?;
    Ok(Json(author))
}

#[instrument(skip(state))]
async fn delete_author(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_staff(&user)?;
    if !Author::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Author"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- books ---

#[instrument(skip(state))]
async fn list_books(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Json<Vec<Book>>, ApiError> {
    Ok(Json(Book::list(&state.db).await?))
}

#[instrument(skip(state))]
async fn get_book(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Book>, ApiError> {
    let book = Book::find(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Book"))?;
    Ok(Json(book))
}

#[instrument(skip(state, payload))]
async fn create_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    require_staff(&user)?;
    let isbn = payload.isbn.trim();
    let title = payload.title.trim();
    let author_id = payload.author_id.ok_or_else(|| {
        ApiError::Validation("Please provide all required fields".into())
    })?;
    if isbn.is_empty() || title.is_empty() {
        return Err(ApiError::Validation(
            "Please provide all required fields".into(),
        ));
    }
    let book = Book::create(&state.db, isbn, title, payload.published_date, author_id).await?;
    info!(book_id = %book.id, isbn = %book.isbn, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

#[instrument(skip(state, payload))]
async fn update_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookRequest>,
) -> Result<Json<Book>, ApiError> {
    require_staff(&user)?;
    let book = Book::update(&state.db, id, payload.title.as_deref(), payload.published_date)
        .await?
        .ok_or(ApiError::NotFound("Book"))?;
    Ok(Json(book))
}

#[instrument(skip(state))]
async fn delete_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_staff(&user)?;
    if !Book::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Book"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- borrowing ---

#[instrument(skip(state, payload))]
async fn borrow_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<BorrowRequest>>,
) -> Result<(StatusCode, Json<BorrowRecord>), ApiError> {
    let days = payload
        .and_then(|Json(p)| p.days)
        .unwrap_or(DEFAULT_LOAN_DAYS);
    if days <= 0 {
        return Err(ApiError::Validation(
            "Loan period must be at least one day".into(),
        ));
    }

    if Book::find(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound("Book"));
    }

    let due_at = OffsetDateTime::now_utc() + Duration::days(days);
    let record = BorrowRecord::borrow(&state.db, user.id, id, due_at)
        .await?
        .ok_or_else(|| ApiError::Validation("Book is not available".into()))?;

    info!(user_id = %user.id, book_id = %id, record_id = %record.id, "book borrowed");
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
async fn list_borrows(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<BorrowRecord>>, ApiError> {
    // Staff see every record, members only their own
    let records = match user.role {
        Role::Admin | Role::Librarian => BorrowRecord::list_all(&state.db).await?,
        Role::Member => BorrowRecord::list_by_user(&state.db, user.id).await?,
    };
    Ok(Json(records))
}

#[instrument(skip(state))]
async fn return_book(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BorrowRecord>, ApiError> {
    let record = BorrowRecord::find(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("Borrow record"))?;

    if record.user_id != user.id && require_staff(&user).is_err() {
        return Err(ApiError::Forbidden);
    }
    if record.returned_at.is_some() {
        return Err(ApiError::Validation("Book already returned".into()));
    }

    let record = BorrowRecord::finish(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::Validation("Book already returned".into()))?;

    info!(user_id = %user.id, record_id = %record.id, "book returned");
    Ok(Json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn make_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            role,
            email_verified: true,
            verification_pin_hash: None,
            verification_pin_expires_at: None,
            reset_pin_hash: None,
            reset_pin_expires_at: None,
            password_changed_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn staff_roles_pass_the_gate() {
        assert!(require_staff(&make_user(Role::Admin)).is_ok());
        assert!(require_staff(&make_user(Role::Librarian)).is_ok());
    }

    #[test]
    fn members_are_forbidden_from_catalogue_writes() {
        let err = require_staff(&make_user(Role::Member)).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }
}
