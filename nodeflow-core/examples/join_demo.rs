use nodeflow_core::{copy, JoinReader, Node, Value, VecReader, VecWriter};

fn main() {
    let mut first = VecReader::new(vec![
        Node::document_start(),
        Node::object_start(Some("config")),
        Node::property_start("Debug"),
        Node::value(Value::Bool(true)),
        Node::property_end(),
        Node::object_end(),
        Node::document_end(),
    ]);
    let mut second = VecReader::new(vec![
        Node::document_start(),
        Node::collection_start(Some("items")),
        Node::value(Value::Integer(1)),
        Node::value(Value::Integer(2)),
        Node::collection_end(),
        Node::document_end(),
    ]);

    let mut join = JoinReader::new(vec![&mut first, &mut second]);
    let mut writer = VecWriter::new();
    copy(&mut join, &mut writer).expect("valid sources");

    for node in writer.nodes() {
        println!("{:?}", node);
    }
}
