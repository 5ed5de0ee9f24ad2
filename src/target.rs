use std::future::Future;
use std::path::Path;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{BenchError, ProbeError};
use crate::metrics::bytes_to_mb;

/// Thin wrapper over the `docker` CLI: the lifecycle of the target under test.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn exec(&self, args: &[&str]) -> std::io::Result<Output> {
        debug!(program = %self.program, ?args, "exec");
        // A sampler that gives up on a query drops this future; take the child with it.
        Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn exec_checked(&self, args: &[&str]) -> Result<String, BenchError> {
        let out = self
            .exec(args)
            .await
            .map_err(|e| BenchError::Target(format!("{} {}: {e}", self.program, args.join(" "))))?;
        if !out.status.success() {
            return Err(BenchError::Target(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// `docker build -t <name> <source_dir>`
    pub async fn build_image(&self, name: &str, source_dir: &Path) -> Result<(), BenchError> {
        info!(image = name, dir = %source_dir.display(), "building image");
        let dir = source_dir.to_string_lossy();
        self.exec_checked(&["build", "-t", name, &*dir]).await?;
        info!(image = name, "image built");
        Ok(())
    }

    /// Start a detached, auto-removed container named after its image,
    /// publishing `port` on the same host port.
    pub async fn start_container(&self, name: &str, port: u16) -> Result<(), BenchError> {
        info!(container = name, port, "starting container");
        let publish = format!("{port}:{port}");
        self.exec_checked(&["run", "--rm", "-d", "-p", &publish, "--name", name, name])
            .await?;
        info!(container = name, "container started");
        Ok(())
    }

    /// Stop every running container. Individual stop failures are logged, not fatal.
    pub async fn stop_all(&self) -> Result<usize, BenchError> {
        let ids = self.exec_checked(&["ps", "-q"]).await?;
        let mut stopped = 0;
        for id in ids.split_whitespace() {
            match self.exec_checked(&["stop", id]).await {
                Ok(_) => stopped += 1,
                Err(e) => warn!(container = id, error = %e, "stop failed"),
            }
        }
        info!(stopped, "containers closed");
        Ok(stopped)
    }

    /// Build `image`, run it, and hand over to `body`. Once a start has been
    /// attempted, every container is stopped again, whatever `body` returns.
    pub async fn with_container<T, E, F, Fut>(
        &self,
        image: &str,
        source_dir: &Path,
        port: u16,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<BenchError>,
    {
        self.build_image(image, source_dir).await?;

        let result = match self.start_container(image, port).await {
            Ok(()) => body().await,
            Err(e) => Err(e.into()),
        };

        let cleanup = self.stop_all().await;
        if result.is_err() {
            if let Err(e) = &cleanup {
                warn!(error = %e, "cleanup after a failed run also failed");
            }
        }
        let value = result?;
        cleanup?;
        Ok(value)
    }

    /// Current memory usage of a container in MiB.
    pub async fn query_resource_usage(&self, name: &str) -> Result<f64, ProbeError> {
        let out = self
            .exec(&["stats", "--no-stream", "--format", "{{.MemUsage}}", name])
            .await
            .map_err(|e| ProbeError::Query(e.to_string()))?;

        if !out.status.success() {
            return Err(ProbeError::NotFound(format!(
                "container {name}: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&out.stdout);
        let used = text.split('/').next().unwrap_or_default();
        parse_size(used)
            .map(bytes_to_mb)
            .ok_or_else(|| ProbeError::Query(format!("unparsable memory usage {:?}", text.trim())))
    }
}

/// Parse a docker size such as `12.5MiB`, `980kB` or `1.2GiB` into bytes.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.trim().parse().ok()?;

    let scale: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };

    if value.is_sign_negative() || !value.is_finite() {
        return None;
    }
    Some((value * scale).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_sizes() {
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size(" 2KiB "), Some(2048));
        assert_eq!(parse_size("1.5MiB"), Some(1_572_864));
        assert_eq!(parse_size("1GiB"), Some(1_073_741_824));
        assert_eq!(parse_size("980kB"), Some(980_000));
        assert_eq!(parse_size("3MB"), Some(3_000_000));
        assert_eq!(parse_size("0B"), Some(0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("MiB"), None);
        assert_eq!(parse_size("12 parsecs"), None);
        assert_eq!(parse_size("-4MiB"), None);
    }

    #[tokio::test]
    async fn failing_stats_means_container_gone() {
        // `false` ignores its arguments and exits 1, like `docker stats` on a missing container.
        let docker = DockerCli::new("false");
        assert!(matches!(
            docker.query_resource_usage("web").await,
            Err(ProbeError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    mod lifecycle {
        use super::*;
        use std::cell::Cell;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        /// A fake `docker` that appends its arguments to `calls.log`; `run`
        /// fails when `fail_run` is set.
        fn fake_docker(dir: &Path, fail_run: bool) -> (DockerCli, PathBuf) {
            let log = dir.join("calls.log");
            let script = dir.join("docker");
            let run_exit = if fail_run { 1 } else { 0 };
            fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho \"$*\" >> '{}'\nif [ \"$1\" = run ]; then exit {run_exit}; fi\nexit 0\n",
                    log.display()
                ),
            )
            .unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            (DockerCli::new(script.to_string_lossy()), log)
        }

        fn calls(log: &Path) -> Vec<String> {
            fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        #[tokio::test]
        async fn failed_start_still_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let (docker, log) = fake_docker(dir.path(), true);

            let ran = Cell::new(false);
            let flag = &ran;
            let result: Result<(), BenchError> = docker
                .with_container("web", dir.path(), 8081, || async move {
                    flag.set(true);
                    Ok(())
                })
                .await;

            assert!(matches!(result, Err(BenchError::Target(_))));
            assert!(!ran.get());
            assert_eq!(calls(&log).last().map(String::as_str), Some("ps -q"));
        }

        #[tokio::test]
        async fn failed_body_still_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let (docker, log) = fake_docker(dir.path(), false);

            let result: Result<(), BenchError> = docker
                .with_container("web", dir.path(), 8081, || async {
                    Err(BenchError::InvalidConfig("boom".into()))
                })
                .await;

            assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
            let calls = calls(&log);
            assert!(calls[0].starts_with("build -t web"));
            assert!(calls[1].starts_with("run --rm -d -p 8081:8081"));
            assert_eq!(calls.last().map(String::as_str), Some("ps -q"));
        }
    }

    #[tokio::test]
    async fn missing_cli_is_a_query_failure() {
        let docker = DockerCli::new("definitely-not-a-docker-binary");
        assert!(matches!(
            docker.query_resource_usage("web").await,
            Err(ProbeError::Query(_))
        ));
        assert!(matches!(
            docker.stop_all().await,
            Err(BenchError::Target(_))
        ));
    }
}
