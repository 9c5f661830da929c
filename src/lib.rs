//! Home crate for the workspace's end-to-end scenario suite (`tests/integration/`).
//! The relay itself lives in `services/server`; nothing here ships to production.
