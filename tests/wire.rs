use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use slotchain::auth::Credentials;
use slotchain::booking::BookingPolicy;
use slotchain::gate::AllowAll;
use slotchain::notify::LogNotifier;
use slotchain::tenant::TenantManager;
use slotchain::wire;

const DATE: &str = "2025-09-24";

// ── Test infrastructure ──────────────────────────────────────

fn credentials() -> Credentials {
    Credentials {
        password: "slotchain".into(),
        admin_user: "admin".into(),
        admin_password: "admin-secret".into(),
    }
}

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("slotchain_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(
        dir,
        1000,
        Arc::new(AllowAll),
        Arc::new(LogNotifier),
        BookingPolicy::default(),
    ));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, credentials(), None).await;
            });
        }
    });

    addr
}

async fn try_connect(
    addr: SocketAddr,
    db: &str,
    user: &str,
    password: &str,
) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(db)
        .user(user)
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn admin(addr: SocketAddr, db: &str) -> tokio_postgres::Client {
    try_connect(addr, db, "admin", "admin-secret").await.unwrap()
}

async fn customer(addr: SocketAddr, db: &str) -> tokio_postgres::Client {
    try_connect(addr, db, "guest", "slotchain").await.unwrap()
}

async fn query(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &tokio_postgres::Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.unwrap_err();
    err.as_db_error()
        .map(|e| e.code().code().to_string())
        .unwrap_or_default()
}

async fn seed_slots(client: &tokio_postgres::Client, times: &[&str]) {
    for time in times {
        client
            .simple_query(&format!("INSERT INTO slots (date, time) VALUES ('{DATE}', '{time}')"))
            .await
            .unwrap();
    }
}

fn booking_sql(start: &str, minutes: u32, email: &str) -> String {
    format!(
        "INSERT INTO bookings (date, start, duration_min, name, email, phone) \
         VALUES ('{DATE}', '{start}', {minutes}, 'Jana', '{email}', '0900')"
    )
}

fn locked_times(rows: &[SimpleQueryRow]) -> Vec<String> {
    rows.iter()
        .filter(|r| r.get("locked") == Some("t"))
        .map(|r| r.get("time").unwrap_or_default().to_string())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn chain_booking_over_the_wire() {
    let addr = start_test_server().await;
    let admin = admin(addr, "salon").await;
    seed_slots(&admin, &["09:00", "09:20", "09:40", "10:00"]).await;

    let guest = customer(addr, "salon").await;
    let rows = query(&guest, &booking_sql("09:00", 60, "jana@example.com")).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("start"), Some("09:00"));
    assert_eq!(rows[0].get("end"), Some("10:00"));
    assert_eq!(rows[0].get("duration_min"), Some("60"));
    let reservations: serde_json::Value =
        serde_json::from_str(rows[0].get("reservations").unwrap()).unwrap();
    assert_eq!(reservations.as_array().map(Vec::len), Some(3));

    let slots = query(&guest, &format!("SELECT * FROM slots WHERE date = '{DATE}'")).await;
    assert_eq!(locked_times(&slots), ["09:00", "09:20", "09:40"]);

    let reserved = query(&admin, &format!("SELECT * FROM reservations WHERE date = '{DATE}'")).await;
    assert_eq!(reserved.len(), 3);
    assert!(reserved.iter().all(|r| r.get("email") == Some("jana@example.com")));
}

#[tokio::test]
async fn booking_errors_carry_sqlstates() {
    let addr = start_test_server().await;
    let admin = admin(addr, "errors").await;
    seed_slots(&admin, &["09:00", "09:20", "10:00"]).await;
    let guest = customer(addr, "errors").await;

    // 09:20 -> 10:00 breaks the 20 minute grid.
    assert_eq!(sqlstate(&guest, &booking_sql("09:00", 60, "a@example.com")).await, "SB002");
    assert_eq!(sqlstate(&guest, &booking_sql("08:00", 20, "a@example.com")).await, "SB001");
    assert_eq!(sqlstate(&guest, &booking_sql("09:00", 0, "a@example.com")).await, "22023");
    assert_eq!(sqlstate(&guest, &booking_sql("09:00", 20, "not-an-email")).await, "22023");

    query(&guest, &booking_sql("09:20", 20, "a@example.com")).await;
    assert_eq!(sqlstate(&guest, &booking_sql("09:00", 40, "b@example.com")).await, "SB003");

    // Nothing was left half-booked.
    let slots = query(&guest, &format!("SELECT * FROM slots WHERE date = '{DATE}'")).await;
    assert_eq!(locked_times(&slots), ["09:20"]);
}

#[tokio::test]
async fn customer_cannot_run_admin_commands() {
    let addr = start_test_server().await;
    let guest = customer(addr, "guarded").await;

    let state = sqlstate(&guest, &format!("INSERT INTO slots (date, time) VALUES ('{DATE}', '09:00')")).await;
    assert_eq!(state, "42501");
    let state = sqlstate(&guest, &format!("SELECT * FROM reservations WHERE date = '{DATE}'")).await;
    assert_eq!(state, "42501");

    assert!(try_connect(addr, "guarded", "admin", "slotchain").await.is_err());
    assert!(try_connect(addr, "guarded", "guest", "admin-secret").await.is_err());
}

#[tokio::test]
async fn work_plan_generation_and_starts() {
    let addr = start_test_server().await;
    let admin = admin(addr, "planned").await;

    query(
        &admin,
        &format!(
            "INSERT INTO work_plans (date, windows, slot_len, break_min) \
             VALUES ('{DATE}', '09:00-10:00', 20, 0)"
        ),
    )
    .await;
    let plan = query(&admin, &format!("SELECT * FROM work_plans WHERE date = '{DATE}'")).await;
    assert_eq!(plan[0].get("windows"), Some("09:00-10:00"));

    let result = admin
        .simple_query(&format!("INSERT INTO generated_slots (date, capacity) VALUES ('{DATE}', 1)"))
        .await
        .unwrap();
    assert!(result.iter().any(|m| matches!(m, SimpleQueryMessage::CommandComplete(3))));

    let guest = customer(addr, "planned").await;
    let starts = query(
        &guest,
        &format!("SELECT * FROM starts WHERE date = '{DATE}' AND duration_min = 40"),
    )
    .await;
    let starts: Vec<&str> = starts.iter().filter_map(|r| r.get("start")).collect();
    assert_eq!(starts, ["09:00", "09:20"]);
}

#[tokio::test]
async fn services_drive_booking_length() {
    let addr = start_test_server().await;
    let admin = admin(addr, "services").await;
    seed_slots(&admin, &["09:00", "09:20", "09:40"]).await;

    let created = query(&admin, "INSERT INTO services (name, duration_min) VALUES ('Haircut', 40)").await;
    let service_id = created[0].get("id").unwrap().to_string();
    query(&admin, "INSERT INTO services (name, duration_min, active) VALUES ('Retired', 20, false)").await;

    let guest = customer(addr, "services").await;
    let listed = query(&guest, "SELECT * FROM services").await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].get("name"), Some("Haircut"));
    assert_eq!(query(&admin, "SELECT * FROM services").await.len(), 2);

    let rows = query(
        &guest,
        &format!(
            "INSERT INTO bookings (date, start, service_id, name, email, phone) \
             VALUES ('{DATE}', '09:20', '{service_id}', 'Jana', 'jana@example.com', '0900')"
        ),
    )
    .await;
    assert_eq!(rows[0].get("end"), Some("10:00"));
}

#[tokio::test]
async fn bound_values_keep_dollar_signs() {
    let addr = start_test_server().await;
    let admin = admin(addr, "bound").await;
    seed_slots(&admin, &["09:00", "09:20"]).await;

    let guest = customer(addr, "bound").await;
    let rows = guest
        .query(
            "INSERT INTO bookings (date, start, duration_min, name, email, phone) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[&DATE, &"09:00", &"20", &"Ann $1 $2", &"ann@example.com", &"$6 0900"],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<_, String>("start"), "09:00");

    let reserved = query(&admin, &format!("SELECT * FROM reservations WHERE date = '{DATE}'")).await;
    assert_eq!(reserved[0].get("name"), Some("Ann $1 $2"));
    assert_eq!(reserved[0].get("phone"), Some("$6 0900"));
}

#[tokio::test]
async fn admin_release_reopens_slot() {
    let addr = start_test_server().await;
    let admin = admin(addr, "release").await;
    seed_slots(&admin, &["09:00", "09:20"]).await;

    let guest = customer(addr, "release").await;
    query(&guest, &booking_sql("09:00", 20, "jana@example.com")).await;
    assert_eq!(sqlstate(&guest, &booking_sql("09:00", 20, "eva@example.com")).await, "SB001");

    let reserved = query(&admin, &format!("SELECT * FROM reservations WHERE date = '{DATE}'")).await;
    let id = reserved[0].get("id").unwrap();
    query(&admin, &format!("DELETE FROM reservations WHERE id = '{id}'")).await;

    query(&guest, &booking_sql("09:00", 20, "eva@example.com")).await;
}

#[tokio::test]
async fn providers_are_isolated() {
    let addr = start_test_server().await;
    let a = admin(addr, "provider_a").await;
    seed_slots(&a, &["09:00"]).await;

    let b = customer(addr, "provider_b").await;
    let slots = query(&b, &format!("SELECT * FROM slots WHERE date = '{DATE}'")).await;
    assert!(slots.is_empty());
}

#[tokio::test]
async fn concurrent_customers_share_nothing() {
    let addr = start_test_server().await;
    let admin = admin(addr, "rush").await;
    seed_slots(&admin, &["09:00", "09:20"]).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(tokio::spawn(async move {
            let guest = customer(addr, "rush").await;
            guest
                .simple_query(&booking_sql("09:00", 40, &format!("c{i}@example.com")))
                .await
                .is_ok()
        }));
    }
    let mut won = 0;
    for handle in handles {
        if handle.await.unwrap() {
            won += 1;
        }
    }
    assert_eq!(won, 1);

    let reserved = query(&admin, &format!("SELECT * FROM reservations WHERE date = '{DATE}'")).await;
    assert_eq!(reserved.len(), 2);
}
