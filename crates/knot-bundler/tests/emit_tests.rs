//! Emission, asset modules and id-stability records.

mod helpers;

use knot_bundler::graph::{ModuleCodeId, RuntimeRequirement};
use knot_bundler::{Compiler, CompilerOptions, ModuleRule};
use tempfile::TempDir;

use helpers::{module_by_suffix, write_file};

fn options_for(dir: &TempDir) -> CompilerOptions {
    CompilerOptions::new(dir.path()).output_dir(dir.path().join("dist"))
}

#[tokio::test]
async fn emit_is_idempotent_but_still_reports_assets() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.js", "module.exports = 1;\n");

    let compiler = Compiler::new(options_for(&dir).entry("main", "./a.js")).unwrap();

    let first = compiler.run().await.unwrap();
    assert_eq!(first.assets.len(), 1);
    assert!(first.assets[0].emitted);
    assert!(first.assets[0].written);

    // Unchanged input: the asset is still reported as emitted, but the
    // file is not rewritten.
    let second = compiler.run().await.unwrap();
    assert_eq!(second.assets.len(), 1);
    assert!(second.assets[0].emitted);
    assert!(!second.assets[0].written);

    let content = std::fs::read_to_string(dir.path().join("dist/main.js")).unwrap();
    assert!(content.contains("module.exports = 1;"));
}

#[tokio::test]
async fn txt_asset_rule_reexports_a_public_url() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "a.js",
        "const url = require(\"./note.txt\");\nmodule.exports = url;\n",
    );
    write_file(dir.path(), "note.txt", "remember the milk\n");

    let options = options_for(&dir)
        .entry("main", "./a.js")
        .public_path("/static/")
        .rule(ModuleRule::test(r"\.txt$").module_type("asset/resource"));
    let compiler = Compiler::new(options).unwrap();
    let stats = compiler.run().await.unwrap();
    assert!(stats.errors.is_empty(), "errors: {:?}", stats.errors);

    // The chunk plus the emitted asset file.
    assert_eq!(stats.assets.len(), 2);
    let asset_stat = stats
        .assets
        .iter()
        .find(|a| a.name.ends_with(".txt"))
        .expect("emitted txt asset");
    let asset_content =
        std::fs::read_to_string(dir.path().join("dist").join(&asset_stat.name)).unwrap();
    assert_eq!(asset_content, "remember the milk\n");

    let chunk_stat = stats.assets.iter().find(|a| a.name == "main.js").unwrap();
    let rendered =
        std::fs::read_to_string(dir.path().join("dist").join(&chunk_stat.name)).unwrap();
    // The asset module merely re-exports the computed public URL.
    assert!(rendered.contains("__knot_require__.p = \"/static/\";"));
    assert!(rendered.contains(&format!(
        "module.exports = __knot_require__.p + \"{}\";",
        asset_stat.name
    )));

    let compilation = compiler.compile().await.unwrap();
    let main = compilation.chunk_graph.chunk_by_name("main").unwrap();
    let requirements = compilation.chunk_graph.chunk_runtime_requirements(main);
    assert!(requirements.contains(&RuntimeRequirement::PublicPath));
    assert!(!requirements.contains(&RuntimeRequirement::ModuleFactories));
    assert!(!requirements.contains(&RuntimeRequirement::InterceptModuleExecution));
}

#[tokio::test]
async fn records_pin_module_ids_across_builds() {
    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("records.json");
    write_file(
        dir.path(),
        "a.js",
        "const b = require(\"./b.js\");\nmodule.exports = b;\n",
    );
    write_file(dir.path(), "b.js", "module.exports = 1;\n");

    let options = || {
        options_for(&dir)
            .entry("main", "./a.js")
            .records_path(&records_path)
    };

    let compiler = Compiler::new(options()).unwrap();
    compiler.run().await.unwrap();
    let first = compiler.compile().await.unwrap();
    let a = module_by_suffix(&first, "a.js");
    let b = module_by_suffix(&first, "b.js");
    assert_eq!(first.chunk_graph.module_id(&a), Some(&ModuleCodeId::Num(0)));
    assert_eq!(first.chunk_graph.module_id(&b), Some(&ModuleCodeId::Num(1)));

    // A new module whose identifier sorts first would steal id 0 without
    // records; with records, existing modules keep their ids.
    write_file(dir.path(), "0early.js", "module.exports = 0;\n");
    write_file(
        dir.path(),
        "a.js",
        "const e = require(\"./0early.js\");\nconst b = require(\"./b.js\");\nmodule.exports = b + e;\n",
    );

    let compiler = Compiler::new(options()).unwrap();
    compiler.run().await.unwrap();
    let second = compiler.compile().await.unwrap();
    let a = module_by_suffix(&second, "a.js");
    let b = module_by_suffix(&second, "b.js");
    let early = module_by_suffix(&second, "0early.js");
    assert_eq!(second.chunk_graph.module_id(&a), Some(&ModuleCodeId::Num(0)));
    assert_eq!(second.chunk_graph.module_id(&b), Some(&ModuleCodeId::Num(1)));
    assert_eq!(
        second.chunk_graph.module_id(&early),
        Some(&ModuleCodeId::Num(2))
    );
}

#[tokio::test]
async fn records_file_is_sorted_and_keyed_by_compiler() {
    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("records.json");
    write_file(dir.path(), "a.js", "module.exports = 1;\n");

    let options = options_for(&dir)
        .name("web")
        .entry("main", "./a.js")
        .records_path(&records_path);
    Compiler::new(options).unwrap().run().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&records_path).unwrap()).unwrap();
    assert!(raw["web"]["moduleIds"].is_object());
    assert_eq!(raw["web"]["chunkIds"]["main"], "main");
}

#[tokio::test]
async fn content_hash_filename_changes_with_content() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.js", "module.exports = 1;\n");

    let options = options_for(&dir)
        .entry("main", "./a.js")
        .filename("[name].[contenthash].js");

    let first = Compiler::new(options.clone()).unwrap().run().await.unwrap();
    let first_name = first.assets[0].name.clone();
    assert!(first_name.starts_with("main."));
    assert!(first_name.ends_with(".js"));

    write_file(dir.path(), "a.js", "module.exports = 2;\n");
    let second = Compiler::new(options).unwrap().run().await.unwrap();
    let second_name = second.assets[0].name.clone();
    assert_ne!(first_name, second_name);
}
