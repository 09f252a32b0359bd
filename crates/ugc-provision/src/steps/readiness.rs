//! Espera pela rede do container.
//!
//! `Fixed` reproduz a espera cega. `Probe` consulta o DNS de dentro do
//! container com backoff exponencial até o tempo total de espera esgotar.

use crate::backend::{ContainerBackend, ContainerHandle};
use crate::config::ReadinessPolicy;
use crate::error::ProvisionError;
use crate::steps::shell_quote;
use anyhow::Result;
use std::time::Duration;

/// Abstração do `sleep` para os testes não dormirem
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct Waiter<'a> {
    policy: &'a ReadinessPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Waiter<'a> {
    pub fn new(policy: &'a ReadinessPolicy, sleeper: &'a dyn Sleeper) -> Self {
        Self { policy, sleeper }
    }

    pub fn await_network<B: ContainerBackend + ?Sized>(
        &self,
        backend: &B,
        handle: &ContainerHandle,
    ) -> Result<()> {
        match self.policy {
            ReadinessPolicy::Fixed { delay_secs } => {
                tracing::info!(delay_secs, "aguardando rede (espera fixa)");
                self.sleeper.sleep(Duration::from_secs(*delay_secs));
                Ok(())
            }
            ReadinessPolicy::Probe {
                probe_host,
                initial_backoff_ms,
                max_backoff_secs,
                timeout_secs,
            } => self.poll(
                backend,
                handle,
                probe_host,
                Duration::from_millis(*initial_backoff_ms),
                Duration::from_secs(*max_backoff_secs),
                Duration::from_secs(*timeout_secs),
            ),
        }
    }

    fn poll<B: ContainerBackend + ?Sized>(
        &self,
        backend: &B,
        handle: &ContainerHandle,
        probe_host: &str,
        initial_backoff: Duration,
        max_backoff: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let probe = format!("getent hosts {} >/dev/null", shell_quote(probe_host));
        let mut backoff = initial_backoff;
        let mut waited = Duration::ZERO;
        let mut attempt = 1u32;

        loop {
            if backend.exec(handle, &probe)?.success() {
                tracing::info!(container = %handle, attempt, ?waited, "rede pronta");
                return Ok(());
            }
            if waited >= timeout {
                return Err(ProvisionError::ReadinessTimeout {
                    container: handle.to_string(),
                    waited,
                }
                .into());
            }

            let pause = backoff.min(timeout - waited);
            tracing::debug!(attempt, ?pause, "rede ainda indisponível");
            self.sleeper.sleep(pause);
            waited += pause;
            backoff = backoff.saturating_mul(2).min(max_backoff.max(initial_backoff));
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Call, FakeBackend};
    use crate::backend::ExecOutput;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }

    fn probe(timeout_secs: u64) -> ReadinessPolicy {
        ReadinessPolicy::Probe {
            probe_host: "archive.ubuntu.com".into(),
            initial_backoff_ms: 1000,
            max_backoff_secs: 4,
            timeout_secs,
        }
    }

    #[test]
    fn test_fixed_delay_never_probes() {
        let backend = FakeBackend::lxd();
        let sleeper = RecordingSleeper::default();
        let policy = ReadinessPolicy::Fixed { delay_secs: 10 };

        Waiter::new(&policy, &sleeper)
            .await_network(&backend, &ContainerHandle::new("ugc"))
            .unwrap();

        assert_eq!(*sleeper.slept.borrow(), vec![Duration::from_secs(10)]);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_probe_ready_immediately() {
        let backend = FakeBackend::lxd();
        let sleeper = RecordingSleeper::default();
        let policy = probe(60);

        Waiter::new(&policy, &sleeper)
            .await_network(&backend, &ContainerHandle::new("ugc"))
            .unwrap();

        assert!(sleeper.slept.borrow().is_empty());
        assert_eq!(
            backend.calls(),
            vec![Call::Exec(
                "getent hosts archive.ubuntu.com >/dev/null".into()
            )]
        );
    }

    #[test]
    fn test_probe_backs_off_until_ready() {
        let backend = FakeBackend::lxd();
        backend.on_exec_sequence(
            "getent",
            vec![
                ExecOutput::failed(2, ""),
                ExecOutput::failed(2, ""),
                ExecOutput::failed(2, ""),
                ExecOutput::failed(2, ""),
                ExecOutput::ok(""),
            ],
        );
        let sleeper = RecordingSleeper::default();
        let policy = probe(60);

        Waiter::new(&policy, &sleeper)
            .await_network(&backend, &ContainerHandle::new("ugc"))
            .unwrap();

        let secs: Vec<u64> = sleeper.slept.borrow().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 4]);
        assert_eq!(backend.execs().len(), 5);
    }

    #[test]
    fn test_probe_timeout_is_distinct_error() {
        let backend = FakeBackend::lxd();
        backend.on_exec("getent", ExecOutput::failed(2, ""));
        let sleeper = RecordingSleeper::default();
        let policy = probe(10);

        let err = Waiter::new(&policy, &sleeper)
            .await_network(&backend, &ContainerHandle::new("ugc"))
            .unwrap_err();

        match err.downcast_ref::<ProvisionError>() {
            Some(ProvisionError::ReadinessTimeout { container, waited }) => {
                assert_eq!(container, "ugc");
                assert_eq!(*waited, Duration::from_secs(10));
            }
            other => panic!("esperava ReadinessTimeout, veio {other:?}"),
        }
        // 1 + 2 + 4 + 3 (última pausa cortada pelo limite)
        let total: Duration = sleeper.slept.borrow().iter().sum();
        assert_eq!(total, Duration::from_secs(10));
        assert_eq!(sleeper.slept.borrow().last(), Some(&Duration::from_secs(3)));
    }

    #[test]
    fn test_unbounded_backoff_saturates() {
        let backend = FakeBackend::lxd();
        backend.on_exec("getent", ExecOutput::failed(2, ""));
        let sleeper = RecordingSleeper::default();
        let policy = ReadinessPolicy::Probe {
            probe_host: "archive.ubuntu.com".into(),
            initial_backoff_ms: 1000,
            max_backoff_secs: u64::MAX,
            timeout_secs: u64::MAX,
        };

        let err = Waiter::new(&policy, &sleeper)
            .await_network(&backend, &ContainerHandle::new("ugc"))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::ReadinessTimeout { .. })
        ));
        // 1 s, 2 s, ... 2^63 s: soma exata de u64::MAX segundos
        assert_eq!(sleeper.slept.borrow().len(), 64);
    }
}
