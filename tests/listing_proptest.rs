//! Property tests for resource ordering and the document engine

use proptest::prelude::*;

use collabspace::backend::collab::{CrdtDocument, CrdtEngine, DiamondEngine};
use collabspace::backend::objects::display_name;
use collabspace::shared::{sort_resources, EditOperation, Resource, ResourceKind};

fn resource_strategy() -> impl Strategy<Value = Resource> {
    (
        prop_oneof![Just(ResourceKind::File), Just(ResourceKind::Doc)],
        "[a-z0-9]{1,8}",
        "[A-Za-z ]{1,6}",
    )
        .prop_map(|(kind, key, name)| Resource {
            kind,
            key,
            name,
            url: None,
            size: None,
            last_modified: None,
        })
}

/// A plain-string model of the edits the engine should agree with
#[derive(Debug, Clone)]
enum ModelEdit {
    Insert { at: usize, text: String },
    Delete { from: usize, len: usize },
}

fn edit_strategy() -> impl Strategy<Value = ModelEdit> {
    prop_oneof![
        (any::<usize>(), "[a-zé😀 ]{1,4}").prop_map(|(at, text)| ModelEdit::Insert { at, text }),
        (any::<usize>(), 1usize..4).prop_map(|(from, len)| ModelEdit::Delete { from, len }),
    ]
}

proptest! {
    #[test]
    fn prop_sort_ignores_input_order(mut resources in prop::collection::vec(resource_strategy(), 0..20)) {
        let mut sorted = resources.clone();
        sort_resources(&mut sorted);
        resources.reverse();
        sort_resources(&mut resources);
        prop_assert_eq!(&sorted, &resources);

        for pair in sorted.windows(2) {
            prop_assert!(pair[0].name.to_lowercase() <= pair[1].name.to_lowercase());
        }
    }

    #[test]
    fn prop_display_name_strips_timestamp(stamp in 1u64..u64::MAX, name in "[A-Za-z0-9._ -]{1,12}") {
        let key = format!("ABC123/{}-{}", stamp, name);
        prop_assert_eq!(display_name(&key), name.as_str());
    }

    #[test]
    fn prop_engine_matches_string_model(edits in prop::collection::vec(edit_strategy(), 1..30)) {
        let mut doc = DiamondEngine.empty();
        let mut model: Vec<char> = Vec::new();

        for edit in edits {
            let op = match edit {
                ModelEdit::Insert { at, text } => {
                    let at = at % (model.len() + 1);
                    model.splice(at..at, text.chars());
                    EditOperation::insert(at, text)
                }
                ModelEdit::Delete { from, len } => {
                    if model.is_empty() {
                        continue;
                    }
                    let from = from % model.len();
                    let end = (from + len).min(model.len());
                    model.drain(from..end);
                    EditOperation::delete(from, end)
                }
            };
            doc.apply("prop", &op).unwrap();
        }

        let expected: String = model.iter().collect();
        prop_assert_eq!(doc.content(), expected.clone());
        prop_assert_eq!(doc.len(), model.len());

        let reloaded = DiamondEngine.load(&doc.snapshot()).unwrap();
        prop_assert_eq!(reloaded.content(), expected);
    }
}
