//! kelp example: validated JSON endpoints, route groups and middleware.
//!
//! Run with:
//!   cargo run --example echo
//!
//! Try:
//!   curl http://localhost:3000/ping
//!   curl -X POST http://localhost:3000/v1/echo -d '{"name":"kelp"}'
//!   curl -X POST http://localhost:3000/v1/echo -d '{"name":""}'
//!   curl -X POST http://localhost:3000/v1/users/ \
//!        -H 'authorization: Bearer secret' \
//!        -d '{"name":"alice","age":30,"birthday":"1994-05-01"}'
//!   curl http://localhost:3000/v1/users/42?verbose=1 -H 'authorization: Bearer secret'
//!   curl http://localhost:3000/_kelp/metric

use std::time::Instant;

use kelp::validate::{Field, Schema, regex_fn, register_valid_fn};
use kelp::{Context, HandlerRef, Router, Server, Settings, Status, health, middleware};
use serde::{Deserialize, Serialize};

#[tokio::main]
async fn main() -> Result<(), kelp::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let date = regex_fn(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles");
    register_valid_fn("date", date)?;

    let settings = Settings { success_message: "成功".to_owned(), ..Settings::default() };

    let app = Router::new()
        .with_settings(settings)
        .middleware(middleware::recovery())
        .middleware(middleware::trace_id())
        .middleware(middleware::access_log())
        .get("/ping", HandlerRef::unit(|| {}))
        .get("/healthz", health::liveness())
        .get("/_kelp/metric", health::metrics(Instant::now()))
        .group("/v1", |v1| {
            v1.post("/echo", HandlerRef::input_output(echo)).group("/users", |users| {
                users
                    .middleware(middleware::token_auth("secret"))
                    .post("/", HandlerRef::input(create_user))
                    .get("/:id", HandlerRef::output_context(get_user))
            })
        });

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// POST /v1/echo
#[derive(Deserialize)]
struct EchoIn {
    name: String,
}

impl Schema for EchoIn {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[Field::string("name").valid("[1,64],message=name must be 1 to 64 bytes")];
        FIELDS
    }
}

#[derive(Default, Serialize)]
struct EchoOut {
    result: String,
}

fn echo(input: EchoIn, out: &mut EchoOut) {
    out.result = input.name;
}

// POST /v1/users/
#[derive(Deserialize)]
struct NewUser {
    name: String,
    #[serde(default)]
    age: Option<i64>,
    birthday: String,
}

impl Schema for NewUser {
    fn fields() -> &'static [Field] {
        const FIELDS: &[Field] = &[
            Field::string("name").valid(r"/^[a-z]+$/"),
            Field::int("age").valid("optional,[0,150]"),
            Field::string("birthday").valid("@date,message=birthday must be YYYY-MM-DD"),
        ];
        FIELDS
    }
}

fn create_user(user: NewUser) -> Option<Status> {
    if user.name == "root" {
        return Some(Status::forbidden());
    }
    tracing::info!(name = %user.name, age = ?user.age, birthday = %user.birthday, "user created");
    None
}

// GET /v1/users/:id
#[derive(Default, Serialize)]
struct UserOut {
    id: String,
    verbose: bool,
}

fn get_user(out: &mut UserOut, ctx: &mut Context) {
    out.id = ctx.param("id").unwrap_or_default().to_owned();
    out.verbose = ctx.query("verbose").is_some();
}
