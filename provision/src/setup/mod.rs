pub mod host;
pub mod report;
mod steps;
mod utils;
mod verify;

use crate::config::{Config, RetryPolicy};
use crate::context::{ContextUpdate, NodeRole, ProvisioningContext};
use crate::error::InstallError;
use crate::setup::host::Host;
use crate::setup::report::{Applied, RunReport, StepRecord, StepResult};
use crate::setup::steps::{
	ClusterBootstrap, CniInstall, ContainerRuntime, DisableSwap, JoinToken, KernelModules,
	KubeComponents, Preflight, RoleSelector, Sysctl,
};
use std::{thread, time::Duration};
use tracing::{error, info, warn};

pub use utils::local_host;

/// Which node roles a step runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGate {
	Any,
	ControlPlaneOnly,
}

pub trait SetupStep {
	fn name(&self) -> &'static str;
	fn description(&self) -> &'static str;

	fn gate(&self) -> RoleGate {
		RoleGate::Any
	}

	/// Whether `check` guards `set`. Steps that must act on every run return false.
	fn is_idempotent(&self) -> bool {
		true
	}

	/// Whether `set` can change the host. Leading steps that only inspect it
	/// run before the run lock is taken.
	fn mutates_host(&self) -> bool {
		true
	}

	/// Detects host facts the rest of the run depends on, before `check`.
	fn resolve(
		&self,
		_ctx: &ProvisioningContext,
		_host: &Host,
	) -> Result<Option<ContextUpdate>, InstallError> {
		Ok(None)
	}

	/// Detects host facts only `set` needs, after `check` reported work to do.
	fn prepare(
		&self,
		_ctx: &ProvisioningContext,
		_host: &Host,
	) -> Result<Option<ContextUpdate>, InstallError> {
		Ok(None)
	}

	fn check(&self, ctx: &ProvisioningContext, host: &Host) -> Result<bool, InstallError>;
	fn set(&self, ctx: &ProvisioningContext, host: &Host) -> Result<Applied, InstallError>;
}

/// The fixed step order; role gating decides what actually runs.
pub fn steps(config: &Config, role_signal: Option<String>) -> Vec<Box<dyn SetupStep>> {
	vec![
		Box::new(Preflight),
		Box::new(RoleSelector::new(role_signal)),
		Box::new(KernelModules),
		Box::new(DisableSwap),
		Box::new(Sysctl),
		Box::new(ContainerRuntime),
		Box::new(KubeComponents),
		Box::new(ClusterBootstrap),
		Box::new(CniInstall::new(config.cni_wait, config.cni_poll_interval)),
		Box::new(JoinToken),
	]
}

enum Attempt {
	Satisfied,
	Applied(Applied),
}

pub struct Sequencer<'a> {
	host: &'a Host,
	retry: RetryPolicy,
	sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> Sequencer<'a> {
	pub fn new(host: &'a Host, retry: RetryPolicy) -> Self {
		Sequencer {
			host,
			retry,
			sleep: Box::new(thread::sleep),
		}
	}

	pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
		self.sleep = Box::new(sleep);
		self
	}

	#[cfg(test)]
	pub fn run(&self, ctx: &mut ProvisioningContext, steps: &[Box<dyn SetupStep>]) -> RunReport {
		self.run_guarded(ctx, steps, || Ok(()))
			.unwrap_or_default()
	}

	/// Runs the leading inspection-only steps, then calls `acquire` and holds
	/// its guard for the remaining steps and verification. `acquire` is never
	/// called when an inspection step fails.
	pub fn run_guarded<G>(
		&self,
		ctx: &mut ProvisioningContext,
		steps: &[Box<dyn SetupStep>],
		acquire: impl FnOnce() -> Result<G, InstallError>,
	) -> Result<RunReport, InstallError> {
		info!("Provisioning started.");
		let first_mutating = steps
			.iter()
			.position(|step| step.mutates_host())
			.unwrap_or(steps.len());
		let (inspections, changes) = steps.split_at(first_mutating);
		let mut report = RunReport::default();
		if !self.run_steps(ctx, inspections, &mut report) {
			return Ok(report);
		}
		let _guard = acquire()?;
		if self.run_steps(ctx, changes, &mut report) {
			self.finish(ctx, &mut report);
		}
		Ok(report)
	}

	fn finish(&self, ctx: &ProvisioningContext, report: &mut RunReport) {
		report.verification = verify::verify(ctx, self.host);
		info!("Provisioning finished.");
	}

	/// Records each step in `report`; false when one of them aborted the run.
	fn run_steps(
		&self,
		ctx: &mut ProvisioningContext,
		steps: &[Box<dyn SetupStep>],
		report: &mut RunReport,
	) -> bool {
		for step in steps {
			let (result, attempts) = self.run_gated(step.as_ref(), ctx, report);
			match &result {
				StepResult::Success => info!("{}: done.", step.name()),
				StepResult::NoOp => info!("{}: already satisfied.", step.name()),
				StepResult::Skipped => info!("{}: skipped for this role.", step.name()),
				StepResult::RecoverableFailure { reason, .. } => {
					warn!("{}: {reason}", step.name())
				}
				StepResult::FatalFailure { reason } => {
					error!("{}: fatal: {reason}", step.name())
				}
			}
			let is_fatal = result.is_fatal();
			report.steps.push(StepRecord {
				step: step.name(),
				description: step.description(),
				result,
				attempts,
			});
			if is_fatal {
				error!("Provisioning aborted at step {}.", step.name());
				return false;
			}
		}
		true
	}

	fn run_gated(
		&self,
		step: &dyn SetupStep,
		ctx: &mut ProvisioningContext,
		report: &mut RunReport,
	) -> (StepResult, u32) {
		if step.gate() == RoleGate::ControlPlaneOnly {
			match ctx.role() {
				Ok(NodeRole::ControlPlane) => {}
				Ok(NodeRole::Worker) => return (StepResult::Skipped, 0),
				Err(err) => return (StepResult::classify(&err), 0),
			}
		}
		self.run_with_retry(step, ctx, report)
	}

	fn run_with_retry(
		&self,
		step: &dyn SetupStep,
		ctx: &mut ProvisioningContext,
		report: &mut RunReport,
	) -> (StepResult, u32) {
		let mut attempt = 1;
		loop {
			let result = match self.run_once(step, ctx) {
				Ok(Attempt::Satisfied) => StepResult::NoOp,
				Ok(Attempt::Applied(Applied::Done)) => StepResult::Success,
				Ok(Attempt::Applied(Applied::Warned(reason))) => StepResult::RecoverableFailure {
					reason,
					retryable: false,
				},
				Ok(Attempt::Applied(Applied::Issued(credential))) => {
					report.join_credential = Some(credential);
					StepResult::Success
				}
				Err(err) => StepResult::classify(&err),
			};
			match result {
				StepResult::RecoverableFailure {
					reason,
					retryable: true,
				} => {
					if attempt >= self.retry.attempts {
						return (
							StepResult::FatalFailure {
								reason: format!("{reason} (gave up after {attempt} attempts)"),
							},
							attempt,
						);
					}
					let delay = self.retry.delay_after(attempt);
					warn!(
						"{} attempt {attempt} failed: {reason}; retrying in {}s.",
						step.name(),
						delay.as_secs()
					);
					(self.sleep)(delay);
					attempt += 1;
				}
				other => return (other, attempt),
			}
		}
	}

	fn run_once(
		&self,
		step: &dyn SetupStep,
		ctx: &mut ProvisioningContext,
	) -> Result<Attempt, InstallError> {
		if let Some(update) = step.resolve(ctx, self.host)? {
			ctx.apply(update)?;
		}
		if step.is_idempotent() && step.check(ctx, self.host)? {
			return Ok(Attempt::Satisfied);
		}
		if let Some(update) = step.prepare(ctx, self.host)? {
			ctx.apply(update)?;
		}
		info!("{}: applying.", step.name());
		let applied = step.set(ctx, self.host)?;
		if step.is_idempotent() && !step.check(ctx, self.host)? {
			return Err(InstallError::StepFailed { step: step.name() });
		}
		Ok(Attempt::Applied(applied))
	}
}
