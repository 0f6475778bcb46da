// Build script compiling the forward shaders to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|meta| meta.modified()),
        std::fs::metadata(output).and_then(|meta| meta.modified()),
    ) {
        (Ok(source), Ok(output)) => source > output,
        _ => true,
    }
}

fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &Path) -> usize {
    let entries = match std::fs::read_dir(shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {}", shader_dir.display());
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_EXTENSIONS.contains(&ext));
        let Some(stem) = path.file_stem().filter(|_| is_shader) else {
            continue;
        };

        let output = target_dir.join(stem).with_extension("spv");
        if !needs_compile(&path, &output) {
            eprintln!("info: Shader {} is up to date", path.display());
            continue;
        }

        let status = Command::new(glslc)
            .arg("--target-env=vulkan1.2")
            .arg(&path)
            .arg("-o")
            .arg(&output)
            .status();
        match status {
            Ok(status) if status.success() => {
                eprintln!("info: Compiled {} -> {}", path.display(), output.display());
                compiled += 1;
            }
            Ok(status) => panic!(
                "glslc failed for {} with exit code {}",
                path.display(),
                status.code().unwrap_or(-1)
            ),
            Err(e) => panic!("Failed to run glslc for {}: {e}", path.display()),
        }
    }
    compiled
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let workspace_dir = manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf();
    let shader_dir = workspace_dir.join("resources/shaders");

    println!("cargo:rerun-if-changed={}", shader_dir.display());
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        println!("cargo:warning=VULKAN_SDK not set, shader compilation skipped");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        Path::new(&vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        Path::new(&vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        panic!("Shader compiler not found at {}", glslc.display());
    }

    let target_dir = workspace_dir.join("target/shaders");
    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {}: {e}", target_dir.display());
        return;
    }

    match compile_shaders(&shader_dir, &target_dir, &glslc) {
        0 => eprintln!("info: All shaders are up to date"),
        count => eprintln!("info: Successfully compiled {count} shader(s)"),
    }
}
