use repobridge::backend::{BackendConfig, BackendManager, ManagerConfig};
use repobridge::errors::{ErrorKind, RepoError, RepoResult};
use repobridge::repository::{Repository, RepositoryDefinition};
use repobridge::store::document::MEMORY_BACKEND;
use repobridge_fjall_adapter::FJALL_BACKEND;
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Logical name of the document backend of a test context.
pub const DOCUMENT: &str = "document";
/// Logical name of the key-value backend of a test context.
pub const KEY_VALUE: &str = "kv";
/// Every backend of a test context; contract tests run against each.
pub const BACKENDS: [&str; 2] = [DOCUMENT, KEY_VALUE];

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread to avoid thread exhaustion when running many tests in parallel.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> RepoResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> RepoResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> RepoResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx.clone()) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx.clone());
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("Unknown panic: {:?}", panic_err.type_id())
                };

                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A manager with one in-process document backend and one fjall backend
/// living in a fresh temp directory.
#[derive(Clone)]
pub struct TestContext {
    path: String,
    manager: BackendManager,
}

impl TestContext {
    pub fn new(path: String, manager: BackendManager) -> Self {
        Self { path, manager }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn manager(&self) -> BackendManager {
        self.manager.clone()
    }

    /// Defines (and provisions) a repository on one backend of the context.
    pub fn repository(&self, backend: &str, definition: RepositoryDefinition) -> RepoResult<Arc<dyn Repository>> {
        self.manager.get_backend(backend)?.define_repository(definition)
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(id.to_string()).to_string_lossy().into_owned()
}

/// Backend configuration of a test context rooted at `path`.
pub fn test_config(path: &str) -> ManagerConfig {
    ManagerConfig::new()
        .with_backend(DOCUMENT, BackendConfig::new(MEMORY_BACKEND, "local", "app"))
        .with_backend(
            KEY_VALUE,
            // low memory preset keeps the worker thread count small per test
            BackendConfig::new(FJALL_BACKEND, path, "app").with_option("preset", "lowMemory"),
        )
}

pub fn create_test_context() -> RepoResult<TestContext> {
    const MAX_ATTEMPTS: u32 = 3;
    let mut last_error: Option<RepoError> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let path = random_path();
        let manager = BackendManager::new(test_config(&path));
        repobridge_fjall_adapter::register(&manager);

        // open both backends eagerly so that a broken keyspace fails here
        let opened = BACKENDS.iter().try_for_each(|name| manager.get_backend(name).map(|_| ()));
        match opened {
            Ok(()) => return Ok(TestContext::new(path, manager)),
            Err(e) => {
                last_error = Some(e);
                let _ = manager.shutdown();
                let _ = fs::remove_dir_all(&path);

                if attempt < MAX_ATTEMPTS {
                    eprintln!(
                        "Warning: Failed to create test context (attempt {}/{}): {:?}",
                        attempt, MAX_ATTEMPTS, last_error
                    );
                    thread::sleep(Duration::from_millis(50 * attempt as u64));
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| RepoError::new("Failed to create test context", ErrorKind::Internal)))
}

pub fn cleanup(ctx: TestContext) -> RepoResult<()> {
    if let Err(e) = ctx.manager().shutdown() {
        eprintln!("Warning: Failed to shut down backends: {:?}", e);
    }

    // Give the keyspace time to release file handles
    thread::sleep(Duration::from_millis(50));

    let path = ctx.path().to_string();
    let max_retries = 15;
    let mut base_delay_ms = 50u64;

    for retry in 0..max_retries {
        if !std::path::Path::new(&path).exists() {
            return Ok(());
        }

        match fs::remove_dir_all(&path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if retry < max_retries - 1 => {
                eprintln!("Warning: Failed to remove {} ({:?}), retrying", path, e.kind());
                thread::sleep(Duration::from_millis(base_delay_ms));
                base_delay_ms = std::cmp::min(base_delay_ms * 2, 1000);
            }
            Err(e) => {
                // Final attempt failed - temp files are left to the OS
                eprintln!(
                    "Warning: Failed to remove test directory {} after {} attempts: {:?}",
                    path, max_retries, e
                );
                return Ok(());
            }
        }
    }

    Ok(())
}
