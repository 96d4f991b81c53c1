use nodeflow_core::{
    run, DelimWriter, FlatMatrixTransform, Node, Settings, Value, VecReader,
};

fn main() {
    let nodes = vec![
        Node::document_start(),
        Node::collection_start(Some("People")),
        Node::object_start(None),
        Node::property_start("Id"),
        Node::value(Value::Integer(1)),
        Node::property_end(),
        Node::property_start("Name"),
        Node::value(Value::String("Ada".into())),
        Node::property_end(),
        Node::object_end(),
        Node::object_start(None),
        Node::property_start("Id"),
        Node::value(Value::Integer(2)),
        Node::property_end(),
        Node::object_end(),
        Node::collection_end(),
        Node::document_end(),
    ];

    let mut reader = VecReader::new(nodes);
    let mut transform = FlatMatrixTransform::new(Settings::new().with_headers());
    let mut writer = DelimWriter::new();
    run(&mut reader, &mut transform, &mut writer).expect("balanced input");

    println!("{}", writer.text());
}
