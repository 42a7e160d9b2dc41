//! The operation task: one full execution of an operation on a module.
//!
//! The task owns the flow from request to completed result tree:
//!
//! 1. open the root node, apply the model's continue-on-failure directive
//! 2. run the model's steps in order as children of the model node,
//!    substituting variables into each step first
//! 3. compute the model node's state from its step outcomes
//! 4. resolve triggers against the invoked operation and the model state,
//!    and invoke the ones that fire as children of the root
//! 5. compute the root's state, which fires the completion notification
//!
//! The task never returns an error: every outcome, including faults and
//! interruption, is expressed in the returned result tree.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::info;

use quince_types::execution::ExecutionInfo;
use quince_types::module::{ModelStep, ModuleModel, Trigger};
use quince_types::resource::{Credential, Resource};

use crate::execution::continuation::ContinuationPolicy;
use crate::execution::notification::ResultNotifier;
use crate::execution::result::ExecutionResult;
use crate::execution::runner::run_step;
use crate::execution::trigger::{resolve_for_operation, resolve_for_result};
use crate::plugin::api::{BoxOperation, BoxSession, PluginError};
use crate::plugin::retry::RetryPolicy;
use crate::plugin::session::SessionHandler;
use crate::substitution::engine::{substitute_content, substitute_text};
use crate::substitution::variables::MapVariables;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Everything needed to execute one step: the plugin operation, an
/// optional fresh session, and the resolved resource and credential.
pub struct PluginBinding {
    pub operation: BoxOperation,
    pub session: Option<BoxSession>,
    pub resource: Resource,
    pub credential: Option<Credential>,
}

/// Resolves a model step to the plugin artifacts that execute it.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, step: &ModelStep) -> Result<PluginBinding, PluginError>;
}

/// Invokes the follow-on operation a fired trigger names, reporting into
/// the given result node.
pub trait TriggerInvoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        trigger: &'a Trigger,
        info: &'a ExecutionInfo,
        result: &'a ExecutionResult,
    ) -> BoxFuture<'a, Result<(), PluginError>>;
}

// ---------------------------------------------------------------------------
// OperationTask
// ---------------------------------------------------------------------------

/// Executes operations on module models.
pub struct OperationTask {
    resolver: Arc<dyn PluginResolver>,
    invoker: Arc<dyn TriggerInvoker>,
    retry: RetryPolicy,
    notifier: Option<ResultNotifier>,
}

impl OperationTask {
    pub fn new(
        resolver: Arc<dyn PluginResolver>,
        invoker: Arc<dyn TriggerInvoker>,
        retry: RetryPolicy,
        notifier: Option<ResultNotifier>,
    ) -> Self {
        Self {
            resolver,
            invoker,
            retry,
            notifier,
        }
    }

    /// Execute `info.operation` against the model. Always returns the
    /// completed root of the result tree.
    pub async fn execute(&self, info: &ExecutionInfo, model: &ModuleModel) -> ExecutionResult {
        info!(
            operation = %info.operation,
            module = %info.module,
            environment = %info.environment,
            "executing operation"
        );

        let policy = Arc::new(ContinuationPolicy::new());
        match model.continue_on_failure {
            Some(true) => policy.enable_continue_on_failure(),
            Some(false) => policy.disable_continue_on_failure(),
            None => {}
        }
        let root = ExecutionResult::root_with(
            format!(
                "Operation [{}] on module [{}] in environment [{}]",
                info.operation, info.module, info.environment
            ),
            policy,
            self.notifier.clone(),
        );

        let model_result = self.execute_model(info, model, &root).await;
        if let Some(model_result) = model_result {
            self.invoke_triggers(info, model, &root, &model_result).await;
        }

        if root.is_executing() {
            root.complete_as_computed(format!("Operation [{}] completed.", info.operation));
        }
        info!(
            operation = %info.operation,
            module = %info.module,
            state = %root.state(),
            "operation completed"
        );
        root
    }

    /// Run the model's steps under a model node. Returns `None` when the
    /// model node could not even be opened.
    async fn execute_model(
        &self,
        info: &ExecutionInfo,
        model: &ModuleModel,
        root: &ExecutionResult,
    ) -> Option<ExecutionResult> {
        let description = model
            .description
            .clone()
            .unwrap_or_else(|| format!("Module [{}]", info.module));
        let model_result = root.add_child(description).ok()?;
        let variables = MapVariables::new(model.variables.clone());

        for step in &model.steps {
            let step_description = substitute_text(&step.description, &variables);
            let content = substitute_content(&step.content, &variables);

            let binding = match self.resolver.resolve(step) {
                Ok(binding) => binding,
                Err(error) => {
                    // An unresolvable step is an errored step, not a dead
                    // execution.
                    match model_result.add_child(step_description) {
                        Ok(child) => {
                            child.complete_as_error(&error);
                            continue;
                        }
                        Err(_) => break,
                    }
                }
            };

            let outcome = run_step(&model_result, step_description, move |child| async move {
                let handler = SessionHandler::new(
                    binding.operation,
                    binding.resource,
                    binding.credential,
                    self.retry.clone(),
                );
                handler.execute(&content, binding.session, &child).await
            })
            .await;
            if outcome.is_err() {
                break;
            }
        }

        if model_result.is_executing() {
            model_result.complete_as_computed("Module executed.");
        }
        Some(model_result)
    }

    /// Resolve and invoke the triggers that fire for this operation and
    /// model outcome, as children of the root.
    async fn invoke_triggers(
        &self,
        info: &ExecutionInfo,
        model: &ModuleModel,
        root: &ExecutionResult,
        model_result: &ExecutionResult,
    ) {
        let firing = resolve_for_result(
            resolve_for_operation(&model.triggers, &info.operation),
            model_result.state(),
        );
        for trigger in firing {
            info!(trigger = %trigger.name, operation = %trigger.operation, "invoking trigger");
            let outcome = run_step(
                root,
                format!("Invoking trigger [{}]", trigger.name),
                |child| async move {
                    self.invoker.invoke(trigger, info, &child).await?;
                    if child.is_executing() {
                        child.complete_as_successful("Trigger invoked.");
                    }
                    Ok(())
                },
            )
            .await;
            if outcome.is_err() {
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
