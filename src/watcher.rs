// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Configuration hot reload.
//!
//! A debounced file watcher turns edits of the configuration file into
//! reload requests, and the reload loop applies each request: re-parse,
//! re-route, swap the dispatcher's control mappings. An invalid file
//! logs a warning and leaves the running configuration in place.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::router::Router;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the configuration file and turns each (debounced) change
/// into a reload request. The returned debouncer must stay alive for
/// the watch to continue.
pub fn watch_config(
    path: &Path,
    reload: Sender<()>,
) -> Result<Debouncer<RecommendedWatcher>, Box<dyn Error>> {
    let path = path.canonicalize()?;
    // Editors typically replace the file on save, which would drop a
    // watch on the file itself. Watch the parent directory and filter.
    let directory = path
        .parent()
        .ok_or("configuration file has no parent directory")?
        .to_path_buf();

    let watched = path.clone();
    let mut debouncer = new_debouncer(DEBOUNCE, move |result: DebounceEventResult| match result {
        Ok(events) => {
            if events.iter().any(|event| event.path == watched) {
                debug!(path = %watched.display(), "Configuration file changed.");
                if let Err(e) = reload.try_send(()) {
                    // A reload is already queued; this change rides
                    // along with it.
                    debug!(err = e.to_string(), "Reload already pending.");
                }
            }
        }
        Err(e) => warn!(err = e.to_string(), "Configuration watch error."),
    })?;

    debouncer
        .watcher()
        .watch(&directory, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "Watching configuration for changes.");
    Ok(debouncer)
}

/// Applies reload requests until the request channel closes. Requests
/// come from the file watcher, the MIDI action binding, and the admin
/// surface alike.
pub async fn run_reloads(
    path: PathBuf,
    router: Arc<Router>,
    dispatcher: Arc<Dispatcher>,
    mut requests: Receiver<()>,
) {
    while requests.recv().await.is_some() {
        match Config::load(&path) {
            Ok(config) => {
                router.reload(&config);
                dispatcher.update_controls(config.midi());
            }
            Err(e) => {
                warn!(
                    err = e.to_string(),
                    "Invalid configuration, keeping the running one."
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::config::Config;
    use crate::dispatch::Dispatcher;
    use crate::engine::mock::Engine as MockEngine;
    use crate::router::Router;
    use crate::testutil::eventually_async;

    const INITIAL: &str = r#"
instruments:
  - name: piano
    file: piano.sf2
    channel: 0
    preset: 0
"#;

    const UPDATED: &str = r#"
instruments:
  - name: organ
    file: piano.sf2
    channel: 1
    preset: 0
"#;

    fn setup(dir: &std::path::Path) -> (std::path::PathBuf, Arc<Router>, Arc<Dispatcher>) {
        fs::write(dir.join("piano.sf2"), b"sf2").expect("write failed");
        let config_path = dir.join("config.yaml");

        // Tests don't run from the temp dir, so the sound-bank
        // reference has to be absolute.
        let absolute = INITIAL.replace(
            "piano.sf2",
            dir.join("piano.sf2").to_str().expect("bad path"),
        );
        fs::write(&config_path, &absolute).expect("write failed");

        let config = Config::load(&config_path).expect("load failed");
        let engine = MockEngine::get();
        let router = Arc::new(Router::new(Arc::new(engine), &config));
        router.preload_all();
        router.activate_current();

        let (reload_tx, _reload_rx) = mpsc::channel(1);
        let dispatcher = Arc::new(Dispatcher::new(router.clone(), config.midi(), reload_tx));
        (config_path, router, dispatcher)
    }

    #[tokio::test]
    async fn test_reload_applies_valid_config() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (config_path, router, dispatcher) = setup(dir.path());
        assert!(router.registry().get("piano").is_some());

        let (request_tx, request_rx) = mpsc::channel(1);
        tokio::spawn(super::run_reloads(
            config_path.clone(),
            router.clone(),
            dispatcher,
            request_rx,
        ));

        let absolute = UPDATED.replace(
            "piano.sf2",
            dir.path().join("piano.sf2").to_str().expect("bad path"),
        );
        fs::write(&config_path, absolute).expect("write failed");
        request_tx.send(()).await.expect("send failed");

        eventually_async(
            || async { router.registry().get("organ").is_some() },
            "reload never applied",
        )
        .await;
        assert!(router.registry().get("piano").is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_keeps_running_state() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let (config_path, router, dispatcher) = setup(dir.path());

        let (request_tx, request_rx) = mpsc::channel(1);
        let handle = tokio::spawn(super::run_reloads(
            config_path.clone(),
            router.clone(),
            dispatcher,
            request_rx,
        ));

        fs::write(&config_path, "instruments: [not: [valid").expect("write failed");
        request_tx.send(()).await.expect("send failed");

        // The loop survives the bad file and the registry is untouched.
        drop(request_tx);
        handle.await.expect("reload loop panicked");
        assert!(router.registry().get("piano").is_some());
    }

    #[tokio::test]
    async fn test_file_watch_requests_reload() {
        let dir = tempfile::tempdir().expect("unable to create temp dir");
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, INITIAL).expect("write failed");

        let (reload_tx, mut reload_rx) = mpsc::channel(1);
        let _debouncer = super::watch_config(&config_path, reload_tx).expect("watch failed");

        fs::write(&config_path, UPDATED).expect("write failed");

        eventually_async(
            || {
                let received = reload_rx.try_recv().is_ok();
                async move { received }
            },
            "file change never produced a reload request",
        )
        .await;
    }
}
