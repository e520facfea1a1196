fn main() {
    let mut config = prost_build::Config::new();
    config.bytes(["."]);
    config
        .compile_protos(
            &[
                "proto/control.proto",
                "proto/data.proto",
                "proto/hid.proto",
                "proto/discovery.proto",
            ],
            &["proto/"],
        )
        .expect("compiling the session-protocol .proto catalog should never fail in-tree");
}
