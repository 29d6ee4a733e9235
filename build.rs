fn main() {
    println!("cargo:rerun-if-changed=proto/collector.proto");
    tonic_prost_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/collector.proto"], &["proto"]) // files, includes
        .expect("Failed to compile collector.proto");
}
