use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    // Proto directory locations:
    // - Workspace build: ../../proto/ (from crates/gladys-proto/)
    // - Docker build: proto/ copied into the build context
    let (proto_dir, protos) = if Path::new("proto/memory.proto").exists() {
        (
            "proto",
            vec![
                "proto/types.proto",
                "proto/memory.proto",
                "proto/orchestrator.proto",
                "proto/executive.proto",
            ],
        )
    } else {
        (
            "../../proto",
            vec![
                "../../proto/types.proto",
                "../../proto/memory.proto",
                "../../proto/orchestrator.proto",
                "../../proto/executive.proto",
            ],
        )
    };

    tonic_build::configure().compile_protos(&protos, &[proto_dir])?;
    Ok(())
}
