use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use codepad_vfs::{
    ConfigStore, FileBackend, KeyValueBackend, Node, NodeId, NodeKind, Project, ProjectBundle,
    ProjectDraft, ProjectId, ProjectPatch, Session,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_DATA_DIR: &str = ".codepad";
const STORE_DIR: &str = "store";
const LOG_ENV: &str = "CODEPAD_LOG";

#[derive(Parser)]
#[command(
    name = "codepad-cli",
    about = "Inspect and edit a codepad virtual file system",
    author,
    version
)]
struct Cli {
    /// 資料目錄；預設為 ./.codepad。 / Data directory (defaults to ./.codepad).
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 顯示目前的檔案樹。 / Print the active file tree.
    Tree(TreeArgs),
    /// 建立檔案或資料夾。 / Create a file or folder.
    Create(CreateArgs),
    /// 重新命名節點。 / Rename a node.
    Rename(RenameArgs),
    /// 刪除節點與其子樹。 / Delete a node and its subtree.
    Delete(NodeArgs),
    /// 切換資料夾展開狀態。 / Toggle a folder's expanded flag.
    Toggle(NodeArgs),
    /// 寫入檔案內容。 / Write a file's content.
    Write(WriteArgs),
    /// 輸出檔案內容。 / Print a file's content.
    Read(NodeArgs),
    /// 依路徑尋找節點。 / Look a node up by path.
    Find(FindArgs),
    /// 依名稱搜尋節點。 / Search nodes by name.
    Search(SearchArgs),
    /// 複製並貼上節點。 / Copy a node and paste it.
    Duplicate(TransferArgs),
    /// 剪下並貼上節點。 / Cut a node and paste it elsewhere.
    Move(TransferArgs),
    /// 清除孤立的檔案內容。 / Remove content no tree references.
    Purge,
    /// 管理專案。 / Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// 匯出專案。 / Export a project bundle.
    Export(ExportArgs),
    /// 匯入專案。 / Import a project bundle.
    Import(ImportArgs),
}

#[derive(Args)]
struct TreeArgs {
    /// 以 JSON 輸出。 / Print the serialized tree as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindChoice {
    File,
    #[value(alias = "dir")]
    Folder,
}

impl From<KindChoice> for NodeKind {
    fn from(choice: KindChoice) -> Self {
        match choice {
            KindChoice::File => NodeKind::File,
            KindChoice::Folder => NodeKind::Folder,
        }
    }
}

#[derive(Args)]
struct CreateArgs {
    /// 節點類型。 / Kind of node to create.
    #[arg(value_enum)]
    kind: KindChoice,
    /// 節點名稱。 / Node name.
    name: String,
    /// 父資料夾路徑；略過則建立於根層級。 / Parent folder path; root level when omitted.
    #[arg(long, value_name = "PATH")]
    parent: Option<String>,
}

#[derive(Args)]
struct NodeArgs {
    /// 節點識別碼。 / Node id.
    id: String,
}

#[derive(Args)]
struct RenameArgs {
    /// 節點識別碼。 / Node id.
    id: String,
    /// 新名稱。 / New name.
    name: String,
}

#[derive(Args)]
struct WriteArgs {
    /// 檔案識別碼。 / File id.
    id: String,
    /// 要寫入的內容。 / Content to store.
    #[arg(long, value_name = "TEXT")]
    content: String,
}

#[derive(Args)]
struct FindArgs {
    /// 完整路徑。 / Full slash-separated path.
    path: String,
}

#[derive(Args)]
struct SearchArgs {
    /// 名稱片段（不分大小寫）。 / Name fragment (case-insensitive).
    query: String,
}

#[derive(Args)]
struct TransferArgs {
    /// 來源節點識別碼。 / Source node id.
    id: String,
    /// 目標資料夾路徑；略過則貼到根層級。 / Target folder path; root level when omitted.
    #[arg(long, value_name = "PATH")]
    target: Option<String>,
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// 建立專案。 / Create a project from a template.
    Create(ProjectCreateArgs),
    /// 列出所有專案。 / List every project.
    List,
    /// 開啟專案。 / Make a project current.
    Open(ProjectArgs),
    /// 關閉目前專案。 / Close the current project.
    Close,
    /// 刪除專案。 / Delete a project and its content.
    Delete(ProjectArgs),
    /// 列出最近開啟的專案。 / List recently opened projects.
    Recent,
    /// 搜尋專案。 / Search projects by name, description, or language.
    Search(SearchArgs),
    /// 顯示目前專案。 / Show the current project.
    Current,
    /// 重新命名專案。 / Rename a project.
    Rename(ProjectRenameArgs),
}

#[derive(Args)]
struct ProjectCreateArgs {
    /// 專案名稱。 / Project name.
    name: String,
    /// 範本語言。 / Template language.
    #[arg(long)]
    language: Option<String>,
    /// 專案描述。 / Project description.
    #[arg(long)]
    description: Option<String>,
    /// 專案類型標籤。 / Free-form project type.
    #[arg(long = "type", value_name = "TYPE")]
    project_type: Option<String>,
}

#[derive(Args)]
struct ProjectArgs {
    /// 專案識別碼。 / Project id.
    id: String,
}

#[derive(Args)]
struct ProjectRenameArgs {
    /// 專案識別碼。 / Project id.
    id: String,
    /// 新名稱。 / New name.
    name: String,
}

#[derive(Args)]
struct ExportArgs {
    /// 專案識別碼。 / Project id.
    id: String,
    /// 輸出檔案路徑。 / Destination file path.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct ImportArgs {
    /// 專案包路徑。 / Bundle file to import.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("codepad=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn run() -> Result<()> {
    let Cli { data_dir, command } = Cli::parse();
    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let mut session = open_session(&data_dir)?;
    match command {
        Commands::Tree(args) => execute_tree(&session, args),
        Commands::Create(args) => {
            let kind = NodeKind::from(args.kind);
            let node = session.create_node(kind, &args.name, args.parent.as_deref())?;
            println!("Created {} '{}' [{}]", kind_label(kind), node.path, node.id);
            Ok(())
        }
        Commands::Rename(args) => {
            let node = session.rename_node(&NodeId::from_string(args.id), &args.name)?;
            println!("Renamed to '{}' [{}]", node.path, node.id);
            Ok(())
        }
        Commands::Delete(args) => {
            let removed = session.delete_node(&NodeId::from_string(args.id))?;
            println!(
                "Deleted '{}' ({} node(s))",
                removed.path,
                removed.walk().len()
            );
            Ok(())
        }
        Commands::Toggle(args) => {
            let node = session.toggle_expanded(&NodeId::from_string(args.id))?;
            let state = match (node.is_folder(), node.expanded) {
                (false, _) => "a file",
                (true, true) => "expanded",
                (true, false) => "collapsed",
            };
            println!("'{}' is {state}", node.path);
            Ok(())
        }
        Commands::Write(args) => {
            let id = NodeId::from_string(args.id);
            session.write_file(&id, &args.content)?;
            println!("Wrote {} bytes to [{id}]", args.content.len());
            Ok(())
        }
        Commands::Read(args) => {
            let content = session.read_file(&NodeId::from_string(args.id))?;
            print!("{content}");
            Ok(())
        }
        Commands::Find(args) => {
            let Some(node) = session.find_by_path(&args.path) else {
                bail!("no node at '{}'", args.path);
            };
            println!("{}\t{}\t{}", node.id, kind_label(node.kind), node.path);
            Ok(())
        }
        Commands::Search(args) => {
            let hits = session.search_nodes(&args.query);
            if hits.is_empty() {
                println!("No matches found.");
            }
            for node in hits {
                println!("{} [{}]", node.path, node.id);
            }
            Ok(())
        }
        Commands::Duplicate(args) => {
            session.copy(&NodeId::from_string(args.id))?;
            let pasted = session.paste(args.target.as_deref())?;
            println!("Copied to '{}' [{}]", pasted.path, pasted.id);
            Ok(())
        }
        Commands::Move(args) => {
            session.cut(&NodeId::from_string(args.id))?;
            let pasted = session.paste(args.target.as_deref())?;
            println!("Moved to '{}' [{}]", pasted.path, pasted.id);
            Ok(())
        }
        Commands::Purge => {
            let removed = session.purge_orphans()?;
            println!("Removed {removed} orphaned content entries");
            Ok(())
        }
        Commands::Project(subcommand) => execute_project_command(&mut session, subcommand),
        Commands::Export(args) => execute_export(&session, args),
        Commands::Import(args) => execute_import(&mut session, args),
    }
}

fn open_session(data_dir: &Path) -> Result<Session> {
    let config = ConfigStore::load_from_dir(data_dir)
        .with_context(|| format!("failed to load config from {}", data_dir.display()))?;
    tracing::debug!(data_dir = %data_dir.display(), config = ?config.config(), "opening session");
    let backend: Arc<dyn KeyValueBackend> = Arc::new(FileBackend::new(data_dir.join(STORE_DIR)));
    let session = Session::open(backend, config.config().clone())?;
    Ok(session)
}

fn execute_tree(session: &Session, args: TreeArgs) -> Result<()> {
    if args.json {
        println!("{}", session.tree().serialize()?);
        return Ok(());
    }
    if let Some(project) = session.current_project() {
        println!("Project: {} [{}]", project.name, project.id);
    }
    if session.nodes().is_empty() {
        println!("(empty)");
    }
    for node in session.nodes() {
        print_node(node, 0);
    }
    Ok(())
}

fn print_node(node: &Node, depth: usize) {
    let marker = if node.is_folder() { "/" } else { "" };
    println!("{}{}{marker}  [{}]", "  ".repeat(depth), node.name, node.id);
    for child in node.children() {
        print_node(child, depth + 1);
    }
}

fn execute_project_command(session: &mut Session, command: ProjectCommand) -> Result<()> {
    match command {
        ProjectCommand::Create(args) => {
            let mut draft = ProjectDraft::new(args.name);
            draft.language = args.language;
            draft.description = args.description;
            draft.project_type = args.project_type;
            let project = session.create_project(draft)?;
            println!("Created project '{}' [{}]", project.name, project.id);
        }
        ProjectCommand::List => {
            if session.projects().is_empty() {
                println!("No projects.");
            }
            for project in session.projects() {
                print_project(project);
            }
        }
        ProjectCommand::Open(args) => {
            let project = session.open_project(&ProjectId::from_string(args.id))?;
            println!("Opened project '{}' [{}]", project.name, project.id);
        }
        ProjectCommand::Close => {
            if session.current_project().is_none() {
                println!("No project is open.");
            } else {
                session.close_project()?;
                println!("Closed project");
            }
        }
        ProjectCommand::Delete(args) => {
            let removed = session.delete_project(&ProjectId::from_string(args.id))?;
            println!("Deleted project '{}'", removed.name);
        }
        ProjectCommand::Recent => {
            let recent = session.recent_projects();
            if recent.is_empty() {
                println!("No recent projects.");
            }
            for (index, entry) in recent.iter().enumerate() {
                println!("{}. {} [{}]", index + 1, entry.name, entry.id);
            }
        }
        ProjectCommand::Search(args) => {
            let hits = session.search_projects(&args.query);
            if hits.is_empty() {
                println!("No matches found.");
            }
            for project in hits {
                print_project(project);
            }
        }
        ProjectCommand::Current => match session.current_project() {
            Some(project) => print_project(project),
            None => println!("No project is open."),
        },
        ProjectCommand::Rename(args) => {
            let patch = ProjectPatch {
                name: Some(args.name),
                ..ProjectPatch::default()
            };
            let project = session.update_project(&ProjectId::from_string(args.id), patch)?;
            println!("Renamed project to '{}'", project.name);
        }
    }
    Ok(())
}

fn print_project(project: &Project) {
    match &project.language {
        Some(language) => println!("{} [{}] ({language})", project.name, project.id),
        None => println!("{} [{}]", project.name, project.id),
    }
}

fn execute_export(session: &Session, args: ExportArgs) -> Result<()> {
    let bundle = session.export_project(&ProjectId::from_string(args.id))?;
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    fs::write(&args.output, bundle.to_json()?)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "Exported project '{}' to {}",
        bundle.project.name,
        args.output.display()
    );
    Ok(())
}

fn execute_import(session: &mut Session, args: ImportArgs) -> Result<()> {
    let payload = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let bundle = ProjectBundle::from_json(&payload)?;
    let project = session.import_project(bundle)?;
    println!("Imported project '{}' [{}]", project.name, project.id);
    Ok(())
}

fn kind_label(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::File => "file",
        NodeKind::Folder => "folder",
    }
}
