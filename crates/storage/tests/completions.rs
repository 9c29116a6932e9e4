use chrono::Utc;
use sqlx::PgPool;
use storage::dto::completion::{SubmitCompletionRequest, UpdateCompletionRequest};
use storage::dto::map::{CreateMapRequest, FieldChange};
use storage::error::StorageError;
use storage::models::format::{EXPERT_LIST, MAPLIST};
use storage::repository::completion::CompletionRepository;
use storage::repository::map::MapRepository;
use storage::services::permissions::{Capability, StaticPermissions};

const ADMIN: i64 = 1;
const MAPLIST_VERIFIER: i64 = 2;

fn permissions() -> StaticPermissions {
    StaticPermissions::new()
        .superuser(ADMIN)
        .grant(MAPLIST_VERIFIER, Capability::EditCompletion, Some(MAPLIST))
}

async fn seed_maps(pool: &PgPool, codes: &[&str]) {
    let repo = MapRepository::new(pool);
    for (i, code) in codes.iter().enumerate() {
        let req = CreateMapRequest {
            code: code.to_string(),
            name: format!("Map {code}"),
            preview_url: None,
            notes: None,
            placement_curver: Some(i as i32 + 1),
            placement_allver: None,
            difficulty: Some(1),
            botb_difficulty: None,
            remake_of: None,
        };
        repo.create(&req, ADMIN, &permissions()).await.unwrap();
    }
}

fn run(map: &str, format: i32, players: &[i64]) -> SubmitCompletionRequest {
    SubmitCompletionRequest {
        map: map.to_string(),
        format,
        black_border: false,
        no_geraldo: false,
        lcc_leftover: None,
        players: players.to_vec(),
        subm_notes: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_submit_and_accept(pool: PgPool) {
    seed_maps(&pool, &["A"]).await;
    let repo = CompletionRepository::new(&pool);

    let mut req = run("A", MAPLIST, &[10, 11, 10]);
    req.lcc_leftover = Some(1200);
    let submitted = repo.submit(&req).await.unwrap();
    assert!(!submitted.meta.is_accepted());
    assert_eq!(submitted.players, vec![10, 11]);
    assert_eq!(submitted.meta.lcc_leftover, Some(1200));

    let id = submitted.completion.id;
    let accepted = repo.accept(id, MAPLIST_VERIFIER, &permissions()).await.unwrap();
    assert_eq!(accepted.meta.accepted_by, Some(MAPLIST_VERIFIER));

    // Accepting twice appends nothing.
    repo.accept(id, ADMIN, &permissions()).await.unwrap();
    assert_eq!(repo.history(id).await.unwrap().len(), 2);

    let state = repo.state_as_of(id, Utc::now()).await.unwrap();
    assert_eq!(state.row().meta.lcc_leftover, Some(1200));
    assert_eq!(state.row().players, vec![10, 11]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_submit_validation(pool: PgPool) {
    seed_maps(&pool, &["A"]).await;
    let repo = CompletionRepository::new(&pool);

    assert!(matches!(
        repo.submit(&run("A", MAPLIST, &[])).await,
        Err(StorageError::InvalidRequest(_))
    ));
    assert!(matches!(
        repo.submit(&run("NOPE", MAPLIST, &[1])).await,
        Err(StorageError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_permissions_follow_format(pool: PgPool) {
    seed_maps(&pool, &["A"]).await;
    let repo = CompletionRepository::new(&pool);
    let perms = permissions();

    let expert = repo.submit(&run("A", EXPERT_LIST, &[1])).await.unwrap();
    assert!(matches!(
        repo.accept(expert.completion.id, MAPLIST_VERIFIER, &perms).await,
        Err(StorageError::PermissionDenied)
    ));

    let maplist = repo.submit(&run("A", MAPLIST, &[1])).await.unwrap();
    let move_format = UpdateCompletionRequest {
        format: Some(EXPERT_LIST),
        ..UpdateCompletionRequest::default()
    };
    assert!(matches!(
        repo.update(maplist.completion.id, &move_format, MAPLIST_VERIFIER, &perms)
            .await,
        Err(StorageError::PermissionDenied)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_and_delete(pool: PgPool) {
    seed_maps(&pool, &["A"]).await;
    let repo = CompletionRepository::new(&pool);
    let perms = permissions();

    let mut req = run("A", MAPLIST, &[1]);
    req.lcc_leftover = Some(500);
    let id = repo.submit(&req).await.unwrap().completion.id;

    let update = UpdateCompletionRequest {
        black_border: Some(true),
        lcc_leftover: FieldChange::Clear,
        players: Some(vec![2, 3]),
        ..UpdateCompletionRequest::default()
    };
    let updated = repo.update(id, &update, ADMIN, &perms).await.unwrap();
    assert!(updated.meta.black_border);
    assert_eq!(updated.meta.lcc, None);
    assert_eq!(updated.players, vec![2, 3]);

    let deleted = repo.delete(id, ADMIN, &perms).await.unwrap();
    assert!(deleted.meta.deleted_at.is_some());
    repo.delete(id, ADMIN, &perms).await.unwrap();
    assert_eq!(repo.history(id).await.unwrap().len(), 3);

    assert!(repo.state_as_of(id, Utc::now()).await.unwrap().is_deleted());
    assert!(matches!(
        repo.update(id, &update, ADMIN, &perms).await,
        Err(StorageError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_transfer_moves_authorized_runs(pool: PgPool) {
    seed_maps(&pool, &["A", "B"]).await;
    let repo = CompletionRepository::new(&pool);
    let perms = permissions();

    let maplist = repo.submit(&run("A", MAPLIST, &[1])).await.unwrap();
    let expert = repo.submit(&run("A", EXPERT_LIST, &[2])).await.unwrap();

    let copies = repo
        .transfer("A", "B", MAPLIST_VERIFIER, &perms)
        .await
        .unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].completion.map, "B");
    assert_eq!(copies[0].completion.copied_from, Some(maplist.completion.id));
    assert_eq!(copies[0].players, vec![1]);

    let now = Utc::now();
    assert!(repo
        .state_as_of(maplist.completion.id, now)
        .await
        .unwrap()
        .is_deleted());
    assert!(!repo
        .state_as_of(expert.completion.id, now)
        .await
        .unwrap()
        .is_deleted());

    let maplist_only = StaticPermissions::new().grant(9, Capability::EditCompletion, Some(MAPLIST));
    assert!(matches!(
        repo.transfer("A", "B", 9, &maplist_only).await,
        Err(StorageError::PermissionDenied)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_transfer_onto_same_map_is_rejected(pool: PgPool) {
    seed_maps(&pool, &["A"]).await;
    let repo = CompletionRepository::new(&pool);
    let perms = permissions();

    let submitted = repo.submit(&run("A", MAPLIST, &[1])).await.unwrap();

    assert!(matches!(
        repo.transfer("A", "A", MAPLIST_VERIFIER, &perms).await,
        Err(StorageError::Validation(_))
    ));
    assert_eq!(repo.history(submitted.completion.id).await.unwrap().len(), 1);
}
