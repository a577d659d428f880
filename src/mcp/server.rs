//! Stdio MCP server exposing environment operations to agents.
//!
//! One JSON-RPC request per line on stdin, one response per line on stdout;
//! the process runs until stdin closes or a shutdown signal arrives.
//! Handlers never panic: every failure is converted into a JSON-RPC tool
//! error carrying its classified kind, and the stream survives.
//!
//! The container runtime handle and the map of opened repositories live on
//! the server value and flow through tool context; there are no globals.

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt, tool, tool_handler, tool_router};

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::ContainerUseError;
use crate::environment::config::{ServiceConfig, parse_key_values};
use crate::environment::{DEFAULT_SHELL, Environment};
use crate::mcp::models::{
    ConfigPatch, EnvironmentAddServiceRequest, EnvironmentCheckpointRequest,
    EnvironmentConfigRequest, EnvironmentCreateRequest, EnvironmentFileDeleteRequest,
    EnvironmentFileListRequest, EnvironmentFileReadRequest, EnvironmentFileWriteRequest,
    EnvironmentListRequest, EnvironmentOpenRequest, EnvironmentResponse, EnvironmentRunCmdRequest,
    EnvironmentSummary, EnvironmentUpdateMetadataRequest,
};
use crate::mcp::rules::AGENT_RULES;
use crate::repository::Repository;
use crate::runtime::ContainerRuntime;

/// The MCP dispatcher.
#[derive(Clone)]
pub struct EnvironmentServer {
    runtime: Arc<dyn ContainerRuntime>,
    repositories: Arc<DashMap<PathBuf, Arc<Repository>>>,
    /// Which canonical source each environment id was resolved from. The
    /// `environment_source` parameter is redundant on id-taking calls; a
    /// call naming an id under a different source is an agent error, not a
    /// lookup.
    environment_sources: Arc<DashMap<String, PathBuf>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EnvironmentServer {
    /// Create a dispatcher backed by the given container runtime.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            repositories: Arc::new(DashMap::new()),
            environment_sources: Arc::new(DashMap::new()),
            tool_router: Self::tool_router(),
        }
    }

    async fn resolve_repository(
        &self,
        source: &str,
    ) -> std::result::Result<(PathBuf, Arc<Repository>), McpError> {
        let canonical = std::fs::canonicalize(source).map_err(|e| {
            McpError::invalid_params(
                format!("environment_source '{source}' is not accessible: {e}"),
                None,
            )
        })?;
        if let Some(repo) = self.repositories.get(&canonical) {
            return Ok((canonical, Arc::clone(&repo)));
        }
        let repo = Arc::new(Repository::open(&canonical).await.map_err(tool_error)?);
        self.repositories.insert(canonical.clone(), Arc::clone(&repo));
        Ok((canonical, repo))
    }

    /// Resolve an environment id against a source, enforcing that the id is
    /// only ever used with the source it was first resolved from.
    async fn resolve_environment(
        &self,
        source: &str,
        id: &str,
    ) -> std::result::Result<(Arc<Repository>, Arc<Environment>), McpError> {
        let (canonical, repo) = self.resolve_repository(source).await?;
        verify_environment_source(&self.environment_sources, id, &canonical)?;
        let env = repo.get(id, Arc::clone(&self.runtime)).await.map_err(tool_error)?;
        self.environment_sources.insert(id.to_string(), canonical);
        Ok((repo, env))
    }

    #[tool(
        description = "Create a new isolated environment from the source repository. Returns the environment id to use in every later call, plus the commands to share with the user for reviewing the work."
    )]
    async fn environment_create(
        &self,
        params: Parameters<EnvironmentCreateRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (canonical, repo) = self.resolve_repository(&req.environment_source).await?;
        let (dirty, _) = repo.is_dirty().await.map_err(tool_error)?;

        let explanation = req.explanation.unwrap_or_default();
        let env = repo
            .create(&req.title, &explanation, Arc::clone(&self.runtime))
            .await
            .map_err(tool_error)?;
        self.environment_sources.insert(env.id.clone(), canonical);

        let mut response = EnvironmentResponse::from_environment(&env);
        if dirty {
            response = response.with_warning(format!(
                "The source repository had uncommitted changes. They were copied into the \
                 environment's initial commit; the working tree itself was left untouched. \
                 Tell the user that environment '{}' started from their uncommitted state.",
                env.id
            ));
        }
        json_result(&response)
    }

    #[tool(description = "Reload an existing environment and return its metadata.")]
    async fn environment_open(
        &self,
        params: Parameters<EnvironmentOpenRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (_, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;
        json_result(&EnvironmentResponse::from_environment(&env))
    }

    #[tool(description = "Update an environment's metadata, currently its title.")]
    async fn environment_update_metadata(
        &self,
        params: Parameters<EnvironmentUpdateMetadataRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let _applying = env.lock_applying().await;
        if let Some(title) = req.title {
            env.set_title(title);
        }
        repo.update(&env, &req.explanation.unwrap_or_default()).await.map_err(tool_error)?;
        json_result(&EnvironmentResponse::from_environment(&env))
    }

    #[tool(
        description = "Change an environment's configuration (base image, setup commands, env vars, secrets) and rebuild its container. Fields that are provided replace the current values wholesale; an envs list that omits a variable drops it. The rebuild discards all container state outside the workdir."
    )]
    async fn environment_config(
        &self,
        params: Parameters<EnvironmentConfigRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let config = merge_config_patch(env.config(), req.config).map_err(tool_error)?;
        let workdir = config.workdir.clone();

        let _applying = env.lock_applying().await;
        env.update_config(config).await.map_err(tool_error)?;
        repo.update(&env, &req.explanation.unwrap_or_default()).await.map_err(tool_error)?;

        let response = EnvironmentResponse::from_environment(&env).with_warning(format!(
            "The environment was rebuilt from its base image: files under {workdir} were \
             preserved, but everything previous commands changed outside the workdir is gone. \
             This configuration is local to environment '{}'; to keep it for future \
             environments, save it to .container-use/environment.json in the repository.",
            env.id
        ));
        json_result(&response)
    }

    #[tool(description = "List all environments of the source repository, most recently updated first.")]
    async fn environment_list(
        &self,
        params: Parameters<EnvironmentListRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (_, repo) = self.resolve_repository(&req.environment_source).await?;
        let infos = repo.list().await.map_err(tool_error)?;
        let summaries: Vec<EnvironmentSummary> = infos.iter().map(Into::into).collect();
        json_result(&summaries)
    }

    #[tool(
        description = "Run a command inside an environment. Returns the combined output; a non-zero exit code is reported in the text, not as a tool failure. With background=true the command keeps running as a service and the given ports are tunneled to the host."
    )]
    async fn environment_run_cmd(
        &self,
        params: Parameters<EnvironmentRunCmdRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let shell = req.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string());
        let use_entrypoint = req.use_entrypoint.unwrap_or(false);
        let explanation = req.explanation.unwrap_or_default();
        let workdir = env.config().workdir;

        let _applying = env.lock_applying().await;
        if req.background.unwrap_or(false) {
            let ports = req.ports.unwrap_or_default();
            let endpoints = env
                .run_background(&req.command, &shell, use_entrypoint, &ports)
                .await
                .map_err(tool_error)?;
            repo.update(&env, &explanation).await.map_err(tool_error)?;

            let endpoints_json =
                serde_json::to_string_pretty(&endpoints).map_err(|e| tool_error(e.into()))?;
            Ok(text_result(format!(
                "Command started in the background.\nEndpoints:\n{endpoints_json}\n\n\
                 Changes the command makes to {workdir} after this response are NOT committed \
                 to the environment's branch until the next tool call."
            )))
        } else {
            let output = env
                .run(&req.command, &shell, use_entrypoint)
                .await
                .map_err(tool_error)?;
            repo.update(&env, &explanation).await.map_err(tool_error)?;

            Ok(text_result(format!(
                "{output}\n\nAll changes under {workdir} have been committed to the \
                 environment's branch; state outside the workdir lives only in the container \
                 snapshot."
            )))
        }
    }

    #[tool(description = "Read a file inside an environment, whole or as a 1-indexed inclusive line range.")]
    async fn environment_file_read(
        &self,
        params: Parameters<EnvironmentFileReadRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (_, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;
        let contents = env
            .file_read(
                &req.target_file,
                req.should_read_entire_file.unwrap_or(false)
                    || (req.start_line_one_indexed.is_none()
                        && req.end_line_one_indexed_inclusive.is_none()),
                req.start_line_one_indexed,
                req.end_line_one_indexed_inclusive,
            )
            .await
            .map_err(tool_error)?;
        Ok(text_result(contents))
    }

    #[tool(description = "List the entries of a directory inside an environment.")]
    async fn environment_file_list(
        &self,
        params: Parameters<EnvironmentFileListRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (_, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;
        let listing = env.file_list(&req.path).await.map_err(tool_error)?;
        Ok(text_result(listing))
    }

    #[tool(description = "Write a file inside an environment, creating it if needed. The change is committed to the environment's branch.")]
    async fn environment_file_write(
        &self,
        params: Parameters<EnvironmentFileWriteRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let _applying = env.lock_applying().await;
        env.file_write(&req.target_file, &req.contents).await.map_err(tool_error)?;
        repo.update(&env, &req.explanation.unwrap_or_default()).await.map_err(tool_error)?;
        Ok(text_result(format!("Wrote {}.", req.target_file)))
    }

    #[tool(description = "Delete a file inside an environment. The deletion is committed to the environment's branch.")]
    async fn environment_file_delete(
        &self,
        params: Parameters<EnvironmentFileDeleteRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let _applying = env.lock_applying().await;
        env.file_delete(&req.target_file).await.map_err(tool_error)?;
        repo.update(&env, &req.explanation.unwrap_or_default()).await.map_err(tool_error)?;
        Ok(text_result(format!("Deleted {}.", req.target_file)))
    }

    #[tool(
        description = "Start a sidecar service (database, cache, ...) and bind it into the environment's network under its name. Returns the endpoint mappings."
    )]
    async fn environment_add_service(
        &self,
        params: Parameters<EnvironmentAddServiceRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (repo, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;

        let service_config = ServiceConfig {
            name: req.name,
            image: req.image,
            command: req.command,
            ports: req.ports.unwrap_or_default(),
            env: parse_key_values(&req.envs.unwrap_or_default()).map_err(tool_error)?,
            secrets: parse_key_values(&req.secrets.unwrap_or_default()).map_err(tool_error)?,
        };
        let name = service_config.name.clone();

        let _applying = env.lock_applying().await;
        let endpoints = env.add_service(service_config).await.map_err(tool_error)?;
        repo.update(&env, &req.explanation.unwrap_or_default()).await.map_err(tool_error)?;

        let endpoints_json =
            serde_json::to_string_pretty(&endpoints).map_err(|e| tool_error(e.into()))?;
        Ok(text_result(format!(
            "Service '{name}' is running and reachable from the environment under hostname \
             '{name}'.\nEndpoints:\n{endpoints_json}"
        )))
    }

    #[tool(description = "Publish the environment's current container snapshot to a registry. Returns the pushed reference.")]
    async fn environment_checkpoint(
        &self,
        params: Parameters<EnvironmentCheckpointRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let req = params.0;
        let (_, env) =
            self.resolve_environment(&req.environment_source, &req.environment_id).await?;
        let pushed = env.checkpoint(&req.destination).await.map_err(tool_error)?;
        Ok(text_result(format!("Pushed environment snapshot to {pushed}")))
    }
}

#[tool_handler]
impl ServerHandler for EnvironmentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(AGENT_RULES.to_string()),
            ..Default::default()
        }
    }
}

/// Serve the dispatcher over stdin/stdout until the stream closes or a
/// shutdown signal arrives. In-flight handlers are cancelled on shutdown.
pub async fn serve_stdio(runtime: Arc<dyn ContainerRuntime>) -> crate::core::Result<()> {
    let server = EnvironmentServer::new(runtime);
    let service = server.serve(stdio()).await?;

    let cancel = service.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "mcp", "shutdown signal received");
            cancel.cancel();
        }
    });

    let _quit_reason = service.waiting().await?;
    Ok(())
}

fn merge_config_patch(
    mut config: crate::environment::EnvironmentConfig,
    patch: ConfigPatch,
) -> crate::core::Result<crate::environment::EnvironmentConfig> {
    if let Some(base_image) = patch.base_image {
        config.base_image = base_image;
    }
    if let Some(setup_commands) = patch.setup_commands {
        config.setup_commands = setup_commands;
    }
    if let Some(install_commands) = patch.install_commands {
        config.install_commands = install_commands;
    }
    if let Some(envs) = patch.envs {
        config.set_env_list(&envs)?;
    }
    if let Some(secrets) = patch.secrets {
        config.set_secret_list(&secrets)?;
    }
    Ok(config)
}

/// Reject an environment id presented with a different source than the one
/// it was first resolved from in this process.
fn verify_environment_source(
    environment_sources: &DashMap<String, PathBuf>,
    id: &str,
    canonical: &Path,
) -> std::result::Result<(), McpError> {
    if let Some(known) = environment_sources.get(id)
        && known.value().as_path() != canonical
    {
        return Err(McpError::invalid_params(
            format!(
                "environment '{id}' belongs to source '{}', not '{}'",
                known.value().display(),
                canonical.display()
            ),
            None,
        ));
    }
    Ok(())
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn json_result<T: serde::Serialize>(value: &T) -> std::result::Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("failed to encode response: {e}"), None))?;
    Ok(text_result(json))
}

fn tool_error(e: anyhow::Error) -> McpError {
    let message = format!("{e:#}");
    match e.downcast_ref::<ContainerUseError>() {
        Some(
            ContainerUseError::EnvironmentNotFound {
                ..
            }
            | ContainerUseError::NotAGitRepository {
                ..
            }
            | ContainerUseError::ConfigError {
                ..
            }
            | ContainerUseError::InvalidSecret {
                ..
            }
            | ContainerUseError::ServiceExists {
                ..
            },
        ) => McpError::invalid_params(message, None),
        _ => McpError::internal_error(message, None),
    }
}
