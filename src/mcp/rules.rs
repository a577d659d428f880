//! Instruction preamble advertised to MCP clients.

/// Rules every connected agent receives as the server's `instructions`.
pub const AGENT_RULES: &str = r"ALWAYS use environments for ANY and ALL file, code, or shell operations, no matter how small.

- Create an environment with `environment_create` before doing anything else, and reuse its `environment_id` for every later call in the task. Each environment is an isolated container plus a dedicated git branch; nothing you do in it touches the user's checkout.
- Run commands with `environment_run_cmd` and edit files with the `environment_file_*` tools. Never assume a command or file operation happened outside these tools.
- Changes under the environment workdir are committed to the environment's branch after every successful tool call. State outside the workdir (installed packages, files in /tmp) lives only in the container snapshot.
- A non-zero exit code is a result, not a tool failure: inspect the output, fix the problem, and keep going in the same environment.
- When you finish, tell the user how to review and adopt the work by quoting the `checkout_command_to_share_with_user`, `log_command_to_share_with_user`, and `diff_command_to_share_with_user` values from your latest tool response, verbatim.
- If a tool response carries a `warning`, relay it to the user in your next message.
";
