//! Starter trees for new projects, keyed by language.
//! 依語言提供新專案的起始檔案樹。

use crate::tree::{Node, NodeId};

/// A starter tree plus the seed content of its files.
#[derive(Debug, Clone)]
pub struct StarterTree {
    pub nodes: Vec<Node>,
    pub contents: Vec<(NodeId, String)>,
}

/// Languages with a dedicated template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateLanguage {
    JavaScript,
    TypeScript,
    Python,
    Html,
    Rust,
    Java,
    Cpp,
}

impl TemplateLanguage {
    /// Resolves a free-form language name, accepting common aliases.
    pub fn parse(language: &str) -> Option<Self> {
        match language.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" => Some(Self::JavaScript),
            "typescript" | "ts" => Some(Self::TypeScript),
            "python" | "py" => Some(Self::Python),
            "html" | "web" => Some(Self::Html),
            "rust" | "rs" => Some(Self::Rust),
            "java" => Some(Self::Java),
            "cpp" | "c++" => Some(Self::Cpp),
            _ => None,
        }
    }
}

/// Builds the starter tree for a project: a folder named after the project
/// holding the language's files. Unknown or absent languages get a README only.
/// 建立專案起始樹：以專案名稱命名的資料夾，內含對應語言的檔案。
pub fn starter_tree(project_name: &str, language: Option<&str>) -> StarterTree {
    let mut builder = Builder::default();
    let readme = format!("# {project_name}\n");
    let files: Vec<(&str, String)> = match language.and_then(TemplateLanguage::parse) {
        Some(TemplateLanguage::JavaScript) => vec![
            ("index.js", "console.log(\"Hello, world!\");\n".into()),
            ("README.md", readme),
        ],
        Some(TemplateLanguage::TypeScript) => vec![
            (
                "index.ts",
                "const greeting: string = \"Hello, world!\";\nconsole.log(greeting);\n".into(),
            ),
            (
                "tsconfig.json",
                "{\n  \"compilerOptions\": {\n    \"target\": \"es2020\",\n    \"strict\": true\n  }\n}\n"
                    .into(),
            ),
            ("README.md", readme),
        ],
        Some(TemplateLanguage::Python) => vec![
            (
                "main.py",
                "def main():\n    print(\"Hello, world!\")\n\n\nif __name__ == \"__main__\":\n    main()\n"
                    .into(),
            ),
            ("requirements.txt", String::new()),
            ("README.md", readme),
        ],
        Some(TemplateLanguage::Html) => vec![
            (
                "index.html",
                format!(
                    "<!DOCTYPE html>\n<html>\n<head>\n  <title>{project_name}</title>\n  <link rel=\"stylesheet\" href=\"styles.css\">\n</head>\n<body>\n  <h1>{project_name}</h1>\n  <script src=\"script.js\"></script>\n</body>\n</html>\n"
                ),
            ),
            ("styles.css", "body {\n  font-family: sans-serif;\n}\n".into()),
            ("script.js", "console.log(\"ready\");\n".into()),
        ],
        Some(TemplateLanguage::Rust) => vec![
            (
                "Cargo.toml",
                format!(
                    "[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
                    project_name.to_lowercase().replace(' ', "_")
                ),
            ),
            ("README.md", readme),
        ],
        Some(TemplateLanguage::Java) => vec![
            (
                "Main.java",
                "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello, world!\");\n    }\n}\n"
                    .into(),
            ),
            ("README.md", readme),
        ],
        Some(TemplateLanguage::Cpp) => vec![
            (
                "main.cpp",
                "#include <iostream>\n\nint main() {\n    std::cout << \"Hello, world!\" << std::endl;\n    return 0;\n}\n"
                    .into(),
            ),
            ("README.md", readme),
        ],
        None => vec![("README.md", readme)],
    };

    let mut root = Node::folder(project_name);
    if matches!(
        language.and_then(TemplateLanguage::parse),
        Some(TemplateLanguage::Rust)
    ) {
        let main_rs = builder.file("main.rs", "fn main() {\n    println!(\"Hello, world!\");\n}\n");
        root = root.with_child(Node::folder("src").with_child(main_rs));
    }
    for (name, content) in files {
        root = root.with_child(builder.file(name, &content));
    }

    StarterTree {
        nodes: vec![root],
        contents: builder.contents,
    }
}

#[derive(Default)]
struct Builder {
    contents: Vec<(NodeId, String)>,
}

impl Builder {
    fn file(&mut self, name: &str, content: &str) -> Node {
        let node = Node::file(name);
        if !content.is_empty() {
            self.contents.push((node.id.clone(), content.to_string()));
        }
        node
    }
}
