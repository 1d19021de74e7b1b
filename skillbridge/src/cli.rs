use clap::{Parser, Subcommand};

/// SkillBridge - expose sandboxed skills as model tools
#[derive(Parser, Debug)]
#[command(name = "skillbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Skill bundle root (default: SKILLBRIDGE_SKILLS_DIR or ./skills)
    #[arg(long, global = true, value_name = "DIR")]
    pub skills_dir: Option<String>,

    /// Sandbox root every path argument must stay inside (default: SKILLBRIDGE_SANDBOX_ROOT or cwd)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the skill root and print per-skill health and rejected bundles
    Scan,

    /// Write the catalog manifest (JSON)
    Manifest {
        /// Output file; prints to stdout when omitted
        #[arg(short, long, value_name = "FILE")]
        output: Option<String>,
    },

    /// Print the tool declarations a model target would receive
    Tools {
        /// Model target: openai, claude or gemini
        #[arg(long, default_value = "openai")]
        target: String,

        /// Utterance used for tool selection; all skills when omitted
        #[arg(long)]
        query: Option<String>,

        /// Maximum number of tools (default: per-target)
        #[arg(long)]
        max: Option<usize>,
    },

    /// Execute one skill call in the sandbox and print the result
    Exec {
        /// Skill name
        #[arg(value_name = "SKILL")]
        skill: String,

        /// Arguments as a JSON object. Use "-" to read from stdin
        #[arg(value_name = "ARGS_JSON", default_value = "{}")]
        args_json: String,

        /// Run even if the call is high-risk
        #[arg(long)]
        approve: bool,

        /// Execution timeout in seconds (default: from env or 30)
        #[arg(long)]
        timeout: Option<u64>,

        /// Maximum memory limit in MB (default: from env or 256)
        #[arg(long)]
        max_memory: Option<u64>,
    },

    /// Run one agentic turn against the configured model
    Chat {
        /// User message
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Model target: openai, claude or gemini (default: SKILLBRIDGE_MODEL_TARGET or detected)
        #[arg(long)]
        target: Option<String>,

        /// Model name (overrides SKILLBRIDGE_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Maximum model rounds (overrides SKILLBRIDGE_MAX_ITERATIONS)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Custom system prompt
        #[arg(long)]
        system_prompt: Option<String>,

        /// Approve every high-risk call without asking
        #[arg(long)]
        yes: bool,

        /// Show tool arguments and results in full
        #[arg(short, long)]
        verbose: bool,
    },
}
