//! Workspace root. No fabric logic lives here — the orchestrator, the
//! department workers, and the shared infrastructure they sit on are each
//! their own crate under `meridian-*`. This crate exists to host the
//! `meridian` operator binary (database migrations, version info) and to
//! plumb the `test-utils`/`test-db`/`test-messaging`/`test-services`/
//! `test-cluster` feature hierarchy down to every member at once.
