use crate::auth::AuthService;
use crate::config::TocConfig;
use crate::error::AppError;
use crate::db::{
    AiSession, Book, BookElement, BookStatus, Chapter, Database, ElementKind, Image, User,
    now_timestamp,
};
use crate::layout::{ImageLayout, TextWrap};
use crate::toc::TocService;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn create_user(db: &Database, id: &str, username: &str) {
    let user = User {
        id: id.to_string(),
        username: username.to_string(),
        password_hash: "hash".to_string(),
        display_name: None,
        first_name: None,
        last_name: None,
        bio: None,
        avatar_path: None,
        role: "user".to_string(),
        created_at: now_timestamp(),
        last_login: None,
    };
    db.create_user(&user).unwrap();
}

fn create_book(db: &Database, id: &str, owner_id: &str, title: &str) {
    let book = Book {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: title.to_string(),
        description: None,
        status: BookStatus::Draft,
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    };
    db.create_book(&book).unwrap();
}

fn create_chapter(db: &Database, id: &str, book_id: &str, order: i64, words: usize) {
    let content = if words == 0 {
        None
    } else {
        Some(vec!["palavra"; words].join(" "))
    };
    let chapter = Chapter {
        id: id.to_string(),
        book_id: book_id.to_string(),
        author_id: "user-1".to_string(),
        title: format!("Capitulo {}", order + 1),
        content,
        order_index: order,
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    };
    db.create_chapter(&chapter).unwrap();
}

fn create_image(db: &Database, id: &str, owner_id: &str, book_id: &str) {
    let image = Image {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        book_id: Some(book_id.to_string()),
        chapter_id: None,
        storage_path: format!("{}/{}/{}.png", owner_id, book_id, id),
        alt_text: None,
        file_size: Some(100),
        mime_type: Some("image/png".to_string()),
        position_x: 0.0,
        position_y: 0.0,
        scale: 1.0,
        z_index: 0,
        layout: ImageLayout::Inline,
        text_wrap: TextWrap::None,
        created_at: now_timestamp(),
    };
    db.create_image(&image).unwrap();
}

fn setup_user_and_book(db: &Database) {
    create_user(db, "user-1", "writer");
    create_book(db, "book-1", "user-1", "Meu Livro");
}

#[test]
fn test_book_crud() {
    let db = test_db();
    setup_user_and_book(&db);

    let book = db.get_book("book-1", "user-1").unwrap().unwrap();
    assert_eq!(book.title, "Meu Livro");
    assert_eq!(book.status, BookStatus::Draft);

    assert!(
        db.update_book(
            "book-1",
            "user-1",
            "Novo Titulo",
            Some("descricao"),
            BookStatus::Published,
        )
        .unwrap()
    );
    let book = db.get_book("book-1", "user-1").unwrap().unwrap();
    assert_eq!(book.title, "Novo Titulo");
    assert_eq!(book.status, BookStatus::Published);

    assert!(db.delete_book("book-1", "user-1").unwrap());
    assert!(db.get_book("book-1", "user-1").unwrap().is_none());
}

#[test]
fn test_book_invisible_to_other_users() {
    let db = test_db();
    setup_user_and_book(&db);
    create_user(&db, "user-2", "intruder");

    // The row exists but reads as absent for another owner.
    assert!(db.get_book("book-1", "user-2").unwrap().is_none());
    assert!(db.list_books("user-2").unwrap().is_empty());

    // Scoped writes touch nothing.
    assert!(
        !db.update_book("book-1", "user-2", "Roubado", None, BookStatus::Draft)
            .unwrap()
    );
    assert!(!db.delete_book("book-1", "user-2").unwrap());
    assert_eq!(
        db.get_book("book-1", "user-1").unwrap().unwrap().title,
        "Meu Livro"
    );
}

#[test]
fn test_chapter_ordering_and_reorder() {
    let db = test_db();
    setup_user_and_book(&db);
    create_chapter(&db, "c1", "book-1", 0, 10);
    create_chapter(&db, "c2", "book-1", 1, 10);
    create_chapter(&db, "c3", "book-1", 2, 10);

    assert_eq!(db.next_chapter_order("book-1").unwrap(), 3);

    let ids: Vec<String> = ["c3", "c1", "c2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(db.reorder_chapters("book-1", &ids).unwrap(), 3);

    let chapters = db.list_chapters("book-1").unwrap();
    let ordered: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ordered, vec!["c3", "c1", "c2"]);
    // Ranks are dense after a reorder.
    let ranks: Vec<i64> = chapters.iter().map(|c| c.order_index).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
}

#[test]
fn test_reorder_rejects_incomplete_id_list() {
    let db = test_db();
    setup_user_and_book(&db);
    create_chapter(&db, "c1", "book-1", 0, 10);
    create_chapter(&db, "c2", "book-1", 1, 10);
    create_chapter(&db, "c3", "book-1", 2, 10);

    // A partial list must not re-rank anything.
    let partial = vec!["c3".to_string()];
    assert!(matches!(
        db.reorder_chapters("book-1", &partial),
        Err(AppError::Validation(_))
    ));

    // A duplicate id hides another chapter even when the length matches.
    let duped: Vec<String> = ["c3", "c3", "c1"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        db.reorder_chapters("book-1", &duped),
        Err(AppError::Validation(_))
    ));

    // An id from another book fails and rolls the transaction back.
    let foreign: Vec<String> = ["c3", "c1", "nope"].iter().map(|s| s.to_string()).collect();
    assert!(matches!(
        db.reorder_chapters("book-1", &foreign),
        Err(AppError::Validation(_))
    ));

    let chapters = db.list_chapters("book-1").unwrap();
    let ranks: Vec<i64> = chapters.iter().map(|c| c.order_index).collect();
    assert_eq!(ranks, vec![0, 1, 2]);
    let ids: Vec<&str> = chapters.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
}

#[test]
fn test_chapter_range_filter() {
    let db = test_db();
    setup_user_and_book(&db);
    for i in 0..5 {
        create_chapter(&db, &format!("c{}", i), "book-1", i, 5);
    }

    let slice = db.list_chapters_in_range("book-1", 1, 3).unwrap();
    let ids: Vec<&str> = slice.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
}

#[test]
fn test_chapter_scoped_through_book_owner() {
    let db = test_db();
    setup_user_and_book(&db);
    create_user(&db, "user-2", "intruder");
    create_chapter(&db, "c1", "book-1", 0, 10);

    assert!(db.get_chapter("c1", "user-1").unwrap().is_some());
    assert!(db.get_chapter("c1", "user-2").unwrap().is_none());
    assert!(!db.update_chapter("c1", "user-2", "x", None).unwrap());
    assert!(!db.delete_chapter("c1", "user-2").unwrap());
}

#[test]
fn test_element_crud_and_kinds() {
    let db = test_db();
    setup_user_and_book(&db);

    assert_eq!(ElementKind::ALL.len(), 9);
    assert_eq!(ElementKind::parse("epigraph"), Some(ElementKind::Epigraph));
    assert_eq!(ElementKind::parse("prologue"), None);

    let element = BookElement {
        id: "e1".to_string(),
        book_id: "book-1".to_string(),
        kind: ElementKind::Dedication,
        title: ElementKind::Dedication.default_title().to_string(),
        content: Some("Para quem le".to_string()),
        order_index: 0,
        enabled: true,
    };
    db.create_element(&element).unwrap();

    assert!(
        db.update_element("e1", "user-1", "Dedicatoria", None, false, 0)
            .unwrap()
    );
    assert!(db.list_enabled_elements("book-1").unwrap().is_empty());
    assert_eq!(db.list_elements("book-1").unwrap().len(), 1);

    assert!(db.delete_element("e1", "user-1").unwrap());
}

#[test]
fn test_toc_pagination_from_database() {
    let db = test_db();
    setup_user_and_book(&db);

    // 0, 300 and 900 word chapters: 1, 1 and 3 pages.
    create_chapter(&db, "c1", "book-1", 0, 0);
    create_chapter(&db, "c2", "book-1", 1, 300);
    create_chapter(&db, "c3", "book-1", 2, 900);
    db.create_element(&BookElement {
        id: "e1".to_string(),
        book_id: "book-1".to_string(),
        kind: ElementKind::Preface,
        title: "Prefacio".to_string(),
        content: None,
        order_index: 0,
        enabled: true,
    })
    .unwrap();

    let toc_service = TocService::new(db.clone(), TocConfig::default());
    let book = db.get_book("book-1", "user-1").unwrap().unwrap();
    let toc = toc_service.compute(&book).unwrap();

    assert_eq!(toc.len(), 4);
    assert_eq!(toc[0].kind, "element");
    assert_eq!(toc[0].start_page, 1);
    assert_eq!(toc[1].start_page, 3);
    assert_eq!(toc[1].page_count, 1);
    assert_eq!(toc[2].start_page, 4);
    assert_eq!(toc[2].page_count, 1);
    assert_eq!(toc[3].start_page, 5);
    assert_eq!(toc[3].page_count, 3);
}

#[test]
fn test_disabled_elements_left_out_of_toc() {
    let db = test_db();
    setup_user_and_book(&db);
    db.create_element(&BookElement {
        id: "e1".to_string(),
        book_id: "book-1".to_string(),
        kind: ElementKind::Glossary,
        title: "Glossario".to_string(),
        content: None,
        order_index: 0,
        enabled: false,
    })
    .unwrap();
    create_chapter(&db, "c1", "book-1", 0, 10);

    let toc_service = TocService::new(db.clone(), TocConfig::default());
    let book = db.get_book("book-1", "user-1").unwrap().unwrap();
    let toc = toc_service.compute(&book).unwrap();

    assert_eq!(toc.len(), 1);
    assert_eq!(toc[0].kind, "chapter");
    assert_eq!(toc[0].start_page, 1);
}

#[test]
fn test_image_layout_defaults_and_reset() {
    let db = test_db();
    setup_user_and_book(&db);
    create_image(&db, "img-1", "user-1", "book-1");

    assert!(
        db.update_image_position("img-1", "user-1", 40.0, -12.5)
            .unwrap()
    );
    assert!(
        db.update_image_layout(
            "img-1",
            "user-1",
            2.0,
            5,
            ImageLayout::FloatLeft,
            TextWrap::Wrap,
            Some("capa"),
        )
        .unwrap()
    );

    let image = db.get_image("img-1", "user-1").unwrap().unwrap();
    assert_eq!(image.position_x, 40.0);
    assert_eq!(image.scale, 2.0);
    assert_eq!(image.layout, ImageLayout::FloatLeft);
    assert_eq!(image.text_wrap, TextWrap::Wrap);

    // Reset is one update restoring every layout property.
    assert!(db.reset_image_layout("img-1", "user-1").unwrap());
    let image = db.get_image("img-1", "user-1").unwrap().unwrap();
    assert_eq!(image.position_x, 0.0);
    assert_eq!(image.position_y, 0.0);
    assert_eq!(image.scale, 1.0);
    assert_eq!(image.z_index, 0);
    assert_eq!(image.layout, ImageLayout::Inline);
    assert_eq!(image.text_wrap, TextWrap::None);
    // Alt text survives a reset.
    assert_eq!(image.alt_text.as_deref(), Some("capa"));
}

#[test]
fn test_image_owner_scoping() {
    let db = test_db();
    setup_user_and_book(&db);
    create_user(&db, "user-2", "intruder");
    create_image(&db, "img-1", "user-1", "book-1");

    assert!(db.get_image("img-1", "user-2").unwrap().is_none());
    assert!(!db.update_image_position("img-1", "user-2", 1.0, 1.0).unwrap());
    assert!(!db.reset_image_layout("img-1", "user-2").unwrap());
    assert!(!db.delete_image("img-1", "user-2").unwrap());
}

#[test]
fn test_cover_replace_keeps_single_row() {
    let db = test_db();
    setup_user_and_book(&db);
    create_image(&db, "img-1", "user-1", "book-1");
    create_image(&db, "img-2", "user-1", "book-1");

    db.set_book_cover("book-1", "img-1").unwrap();
    db.set_book_cover("book-1", "img-2").unwrap();

    let cover = db.get_book_cover("book-1").unwrap().unwrap();
    assert_eq!(cover.image_id, "img-2");
}

#[test]
fn test_auth_register_login_logout() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);

    let user = auth.register("escritor", "senha123").unwrap();
    assert_eq!(user.role, "user");

    // Duplicate username rejected.
    assert!(auth.register("escritor", "outra").is_err());

    let (logged_in, token) = auth.login("escritor", "senha123", None).unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(auth.validate_token(&token).unwrap().is_some());

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());

    assert!(auth.login("escritor", "errada", None).is_err());
}

#[test]
fn test_auth_registration_disabled() {
    let db = test_db();
    let auth = AuthService::new(db, 30, false);
    assert!(auth.register("alguem", "senha123").is_err());
}

#[test]
fn test_profile_update_feeds_author_name() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true);
    let user = auth.register("escritor", "senha123").unwrap();
    assert_eq!(user.author_name(), "escritor");

    let updated = auth
        .update_profile(&user.id, None, Some("Ana"), Some("Silva"), None, None)
        .unwrap();
    assert_eq!(updated.author_name(), "Ana Silva");

    let updated = auth
        .update_profile(&user.id, Some("A. Silva"), None, None, None, None)
        .unwrap();
    assert_eq!(updated.author_name(), "A. Silva");
}

#[test]
fn test_expired_session_rejected() {
    let db = test_db();
    create_user(&db, "user-1", "writer");
    db.create_session(&crate::db::Session {
        token: "expired-token".to_string(),
        user_id: "user-1".to_string(),
        device_id: None,
        expires_at: now_timestamp() - 10,
    })
    .unwrap();

    let auth = AuthService::new(db.clone(), 30, true);
    assert!(auth.validate_token("expired-token").unwrap().is_none());
    // The expired row is deleted on rejection.
    assert!(db.get_session("expired-token").unwrap().is_none());
}

#[test]
fn test_ai_session_audit_rows() {
    let db = test_db();
    setup_user_and_book(&db);

    let result = crate::assist::enrich_text(
        "texto para mim revisar",
        crate::assist::EnrichGoal::Grammar,
    )
    .unwrap();
    crate::assist::audit(
        &db,
        "user-1",
        Some("book-1"),
        None,
        "grammar",
        "texto para mim revisar",
        &result.enriched_text,
    )
    .unwrap();

    let sessions = db.list_ai_sessions("user-1").unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].provider, "local");
    assert_eq!(sessions[0].kind, "grammar");
    assert!(sessions[0].output.contains("eu "));
}

#[test]
fn test_long_prompt_excerpt_truncated() {
    let db = test_db();
    setup_user_and_book(&db);

    let long_input = "a ".repeat(500);
    crate::assist::audit(&db, "user-1", None, None, "prompt", &long_input, "saida").unwrap();

    let sessions = db.list_ai_sessions("user-1").unwrap();
    assert!(sessions[0].prompt_excerpt.chars().count() <= 203);
    assert!(sessions[0].prompt_excerpt.ends_with("..."));
}

#[test]
fn test_activity_log() {
    let db = test_db();
    setup_user_and_book(&db);

    db.log_activity(&crate::db::ActivityEntry {
        id: "a1".to_string(),
        user_id: "user-1".to_string(),
        book_id: Some("book-1".to_string()),
        action: "export".to_string(),
        detail: Some("epub".to_string()),
        created_at: now_timestamp(),
    })
    .unwrap();

    let entries = db.list_activity("user-1").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "export");
    assert_eq!(entries[0].detail.as_deref(), Some("epub"));
    assert!(db.list_activity("user-2").unwrap().is_empty());
}

#[test]
fn test_cascade_delete_cleans_children() {
    let db = test_db();
    setup_user_and_book(&db);
    create_chapter(&db, "c1", "book-1", 0, 10);
    create_image(&db, "img-1", "user-1", "book-1");
    db.set_book_cover("book-1", "img-1").unwrap();

    assert!(db.delete_book("book-1", "user-1").unwrap());
    assert!(db.list_chapters("book-1").unwrap().is_empty());
    assert!(db.list_book_images("book-1").unwrap().is_empty());
    assert!(db.get_book_cover("book-1").unwrap().is_none());
}

#[test]
fn test_ai_session_direct_insert_roundtrip() {
    let db = test_db();
    setup_user_and_book(&db);

    db.create_ai_session(&AiSession {
        id: "s1".to_string(),
        user_id: "user-1".to_string(),
        book_id: None,
        chapter_id: None,
        provider: "local".to_string(),
        kind: "ideas".to_string(),
        prompt_excerpt: "inicio".to_string(),
        output: "inicio e uma sugestao".to_string(),
        created_at: now_timestamp(),
    })
    .unwrap();

    let sessions = db.list_ai_sessions("user-1").unwrap();
    assert_eq!(sessions[0].kind, "ideas");
}
