use chrono::Utc;
use sqlx::PgPool;
use storage::dto::map::{CreateMapRequest, FieldChange, UpdateMapRequest};
use storage::error::StorageError;
use storage::models::ListField;
use storage::models::format::EXPERT_LIST;
use storage::repository::map::MapRepository;
use storage::services::permissions::{Capability, StaticPermissions};

const ADMIN: i64 = 1;
const EXPERT_CURATOR: i64 = 2;

fn permissions() -> StaticPermissions {
    StaticPermissions::new()
        .superuser(ADMIN)
        .grant(EXPERT_CURATOR, Capability::EditMap, Some(EXPERT_LIST))
}

fn new_map(code: &str, curver: Option<i32>) -> CreateMapRequest {
    CreateMapRequest {
        code: code.to_string(),
        name: format!("Map {code}"),
        preview_url: None,
        notes: None,
        placement_curver: curver,
        placement_allver: None,
        difficulty: None,
        botb_difficulty: None,
        remake_of: None,
    }
}

async fn curver_ladder(repo: &MapRepository<'_>) -> Vec<(String, i32)> {
    let mut ladder: Vec<(String, i32)> = repo
        .list_as_of(Utc::now())
        .await
        .unwrap()
        .into_iter()
        .filter_map(|meta| meta.placement_curver.map(|rank| (meta.code, rank)))
        .collect();
    ladder.sort_by_key(|(_, rank)| *rank);
    ladder
}

async fn seed_ladder(repo: &MapRepository<'_>, codes: &[&str]) {
    let perms = permissions();
    for (i, code) in codes.iter().enumerate() {
        repo.create(&new_map(code, Some(i as i32 + 1)), ADMIN, &perms)
            .await
            .unwrap();
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_insert_shifts_ladder(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A", "B", "C", "D", "E"]).await;

    repo.create(&new_map("X", Some(3)), ADMIN, &permissions())
        .await
        .unwrap();

    let ladder = curver_ladder(&repo).await;
    let codes: Vec<&str> = ladder.iter().map(|(code, _)| code.as_str()).collect();
    assert_eq!(codes, vec!["A", "B", "X", "C", "D", "E"]);
    assert!(repo
        .audit_ladder(ListField::PlacementCurver, Utc::now())
        .await
        .unwrap()
        .is_dense());

    // A and B were not shifted, so they still have a single version.
    assert_eq!(repo.history("A").await.unwrap().len(), 1);
    assert_eq!(repo.history("C").await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_position_out_of_range(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A", "B"]).await;

    let result = repo
        .create(&new_map("X", Some(4)), ADMIN, &permissions())
        .await;
    assert!(matches!(
        result,
        Err(StorageError::PositionOutOfRange { max: 3, .. })
    ));
    assert!(matches!(repo.find("X").await, Err(StorageError::NotFound)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_code_is_constraint_violation(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A"]).await;

    let result = repo
        .create(&new_map("A", Some(1)), ADMIN, &permissions())
        .await;
    assert!(matches!(result, Err(StorageError::ConstraintViolation(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_scoped_update_drops_unauthorized_fields(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A", "B"]).await;

    let req = UpdateMapRequest {
        placement_curver: FieldChange::Set(1),
        difficulty: FieldChange::Set(2),
        ..UpdateMapRequest::default()
    };
    let meta = repo
        .update("B", &req, EXPERT_CURATOR, &permissions())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(meta.difficulty, Some(2));
    assert_eq!(meta.placement_curver, Some(2));

    let curver_only = UpdateMapRequest {
        placement_curver: FieldChange::Set(1),
        ..UpdateMapRequest::default()
    };
    assert!(matches!(
        repo.update("B", &curver_only, EXPERT_CURATOR, &permissions()).await,
        Err(StorageError::PermissionDenied)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_is_idempotent(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A", "B", "C"]).await;
    let perms = permissions();

    let deleted = repo.delete("B", ADMIN, &perms).await.unwrap().unwrap();
    assert!(deleted.deleted_at.is_some());
    assert!(!deleted.is_listed());

    let versions = repo.history("B").await.unwrap().len();
    let ladder = curver_ladder(&repo).await;

    repo.delete("B", ADMIN, &perms).await.unwrap();
    assert_eq!(repo.history("B").await.unwrap().len(), versions);
    assert_eq!(curver_ladder(&repo).await, ladder);
    assert_eq!(
        ladder,
        vec![("A".to_string(), 1), ("C".to_string(), 2)]
    );

    let version = repo.meta_as_of("B", Utc::now()).await.unwrap();
    assert!(version.is_deleted());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_remake_reference_is_stolen(pool: PgPool) {
    let retro: i32 = sqlx::query_scalar(
        "INSERT INTO retro_maps (name, game) VALUES ('Monkey Meadow', 'BTD5') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    let repo = MapRepository::new(&pool);
    let perms = permissions();
    let mut first = new_map("A", Some(1));
    first.remake_of = Some(retro);
    repo.create(&first, ADMIN, &perms).await.unwrap();

    let mut second = new_map("B", None);
    second.remake_of = Some(retro);
    repo.create(&second, ADMIN, &perms).await.unwrap();

    let a = repo.meta_as_of("A", Utc::now()).await.unwrap();
    let b = repo.meta_as_of("B", Utc::now()).await.unwrap();
    assert_eq!(a.row().remake_of, None);
    assert_eq!(a.row().placement_curver, Some(1));
    assert_eq!(b.row().remake_of, Some(retro));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_point_in_time_reads(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    let before = Utc::now();
    seed_ladder(&repo, &["A", "B"]).await;
    let listed = Utc::now();

    repo.delete("A", ADMIN, &permissions()).await.unwrap();

    assert!(matches!(
        repo.meta_as_of("A", before).await,
        Err(StorageError::NotFound)
    ));
    let then = repo.meta_as_of("A", listed).await.unwrap();
    assert_eq!(then.active().and_then(|m| m.placement_curver), Some(1));
    assert!(repo.meta_as_of("A", Utc::now()).await.unwrap().is_deleted());

    let b_then = repo.meta_as_of("B", listed).await.unwrap();
    assert_eq!(b_then.row().placement_curver, Some(2));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_ladder_edits_stay_dense(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    seed_ladder(&repo, &["A", "B", "C", "D", "E"]).await;
    let perms = permissions();

    let to_top = UpdateMapRequest {
        placement_curver: FieldChange::Set(1),
        ..UpdateMapRequest::default()
    };
    let to_fifth = UpdateMapRequest {
        placement_curver: FieldChange::Set(5),
        ..UpdateMapRequest::default()
    };
    let new_x = new_map("X", Some(2));
    let new_y = new_map("Y", Some(1));

    let (x, y, e, a) = tokio::join!(
        repo.create(&new_x, ADMIN, &perms),
        repo.create(&new_y, ADMIN, &perms),
        repo.update("E", &to_top, ADMIN, &perms),
        repo.update("A", &to_fifth, ADMIN, &perms),
    );
    x.unwrap();
    y.unwrap();
    e.unwrap();
    a.unwrap();

    let ladder = curver_ladder(&repo).await;
    assert_eq!(ladder.len(), 7);
    assert!(repo
        .audit_ladder(ListField::PlacementCurver, Utc::now())
        .await
        .unwrap()
        .is_dense());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_edits_of_other_fields_are_kept(pool: PgPool) {
    let repo = MapRepository::new(&pool);
    let perms = permissions();
    let a = CreateMapRequest {
        difficulty: Some(0),
        ..new_map("A", Some(1))
    };
    repo.create(&a, ADMIN, &perms).await.unwrap();
    repo.create(&new_map("B", Some(2)), ADMIN, &perms)
        .await
        .unwrap();

    let harder = UpdateMapRequest {
        difficulty: FieldChange::Set(3),
        ..UpdateMapRequest::default()
    };
    let lower = UpdateMapRequest {
        placement_curver: FieldChange::Set(2),
        ..UpdateMapRequest::default()
    };

    let (tier, rank) = tokio::join!(
        repo.update("A", &harder, EXPERT_CURATOR, &perms),
        repo.update("A", &lower, ADMIN, &perms),
    );
    tier.unwrap();
    rank.unwrap();

    let latest = repo.history("A").await.unwrap().pop().unwrap();
    assert_eq!(latest.difficulty, Some(3));
    assert_eq!(latest.placement_curver, Some(2));
    assert_eq!(
        curver_ladder(&repo).await,
        vec![("B".to_string(), 1), ("A".to_string(), 2)]
    );
}
