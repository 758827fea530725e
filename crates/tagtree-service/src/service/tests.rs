use super::*;
use proptest::prelude::*;
use std::sync::Mutex;
use tagtree_gate::{GateConfig, GateError, Grant, Policy, PolicyScope, UserId};
use tagtree_store::{InMemoryContentIndex, StoreError, StoreResult};
use tagtree_types::ModificationDate;

fn service() -> TagsService {
    service_with(TagsConfig::default())
}

fn service_with(config: TagsConfig) -> TagsService {
    TagsService::in_memory(Fixture::sample().unwrap(), config).unwrap()
}

fn admin() -> Actor {
    Actor::admin()
}

fn load(service: &TagsService, id: u64) -> Tag {
    service.load_tag(&admin(), TagId(id)).unwrap()
}

fn ids(tags: &[Tag]) -> Vec<u64> {
    tags.iter().map(|t| t.id.get()).collect()
}

fn content_ids(service: &TagsService, id: u64) -> Vec<u64> {
    service
        .get_related_content(&admin(), TagId(id))
        .unwrap()
        .iter()
        .map(|c| c.id.0)
        .collect()
}

fn invalid_argument(err: ServiceError) -> String {
    match err {
        ServiceError::InvalidArgument { argument, .. } => argument,
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
}

fn assert_valid(service: &TagsService) {
    let report = service.verify(&admin()).unwrap();
    assert!(report.is_valid(), "{:?}", report.violations);
}

/// Editors may read, edit and add anywhere below tag 16.
fn editor_config() -> TagsConfig {
    let editor = Policy {
        id: "cms-editors".into(),
        name: "Editors of the cms subtree".into(),
        applies_to: PolicyScope::Role("editor".into()),
        grants: vec![Grant::new([TagOperation::Read, TagOperation::Edit, TagOperation::Add])
            .within(TagId(16))],
    };
    TagsConfig {
        gate: GateConfig {
            policies: vec![Policy::administrator(), editor],
            ..GateConfig::default()
        },
        ..TagsConfig::default()
    }
}

fn editor() -> Actor {
    Actor::new(UserId(42)).with_role("editor")
}

// -----------------------------------------------------------------------
// 1. Reads
// -----------------------------------------------------------------------
#[test]
fn load_tag_returns_stored_fields() {
    let service = service();
    let tag = load(&service, 40);
    assert_eq!(tag.keyword, "eztags");
    assert_eq!(tag.parent_tag_id, Some(TagId(7)));
    assert_eq!(tag.main_tag_id, None);
    assert_eq!(tag.depth, 3);
    assert_eq!(tag.path_string.to_string(), "/8/7/40/");
    assert_eq!(tag.modification_date.timestamp(), 1_308_153_110);
    assert_eq!(tag.remote_id, "182be0c5cdcd5072bb1864cdee4d3d6e");
}

#[test]
fn load_missing_tag_is_not_found() {
    let service = service();
    assert!(service.load_tag(&admin(), TagId(999)).unwrap_err().is_not_found());
}

#[test]
fn load_by_remote_id() {
    let service = service();
    let tag = service
        .load_tag_by_remote_id(&admin(), "e2c420d928d4bf8ce0ff2ec19b371514")
        .unwrap();
    assert_eq!(tag.id, TagId(16));
    let err = service.load_tag_by_remote_id(&admin(), "nope").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn children_exclude_synonyms_in_keyword_order() {
    let service = service();
    let children = service.load_tag_children(&admin(), TagId(16)).unwrap();
    assert_eq!(ids(&children), vec![17, 18, 19, 20, 21, 22]);
    assert_eq!(service.get_tag_children_count(&admin(), TagId(16)).unwrap(), 6);

    // 25 shares parent 18 with 24 but is a synonym
    assert_eq!(ids(&service.load_tag_children(&admin(), TagId(18)).unwrap()), vec![24]);

    let window = service
        .load_tag_children_slice(&admin(), TagId(16), Slice::new(1, 2))
        .unwrap();
    assert_eq!(ids(&window), vec![18, 19]);
}

#[test]
fn synonyms_of_main_tag() {
    let service = service();
    let synonyms = service.load_tag_synonyms(&admin(), TagId(16)).unwrap();
    // "cms software" sorts before "content management"
    assert_eq!(ids(&synonyms), vec![96, 95]);
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(16)).unwrap(), 2);
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(40)).unwrap(), 0);

    let window = service
        .load_tag_synonyms_slice(&admin(), TagId(16), Slice::new(1, 10))
        .unwrap();
    assert_eq!(ids(&window), vec![95]);
}

#[test]
fn synonyms_of_a_synonym_are_rejected() {
    let service = service();
    let err = service.load_tag_synonyms(&admin(), TagId(95)).unwrap_err();
    assert_eq!(invalid_argument(err), "tag");
    assert!(service
        .get_tag_synonym_count(&admin(), TagId(95))
        .unwrap_err()
        .is_invalid_argument());
}

#[test]
fn related_content() {
    let service = service();
    assert_eq!(content_ids(&service, 16), vec![57, 58]);
    assert_eq!(service.get_related_content_count(&admin(), TagId(16)).unwrap(), 2);
    assert_eq!(service.get_related_content_count(&admin(), TagId(40)).unwrap(), 0);
    let window = service
        .get_related_content_slice(&admin(), TagId(16), Slice::new(1, 1))
        .unwrap();
    assert_eq!(window[0].name, "Community");
}

#[test]
fn roots_and_keyword_lookup() {
    let service = service();
    assert_eq!(ids(&service.load_root_tags(&admin()).unwrap()), vec![16, 8, 26]);
    assert_eq!(ids(&service.load_tags_by_keyword(&admin(), "eztags").unwrap()), vec![40]);
    assert!(service.load_tags_by_keyword(&admin(), "ez").unwrap().is_empty());
}

// -----------------------------------------------------------------------
// 2. Create, update, add synonym
// -----------------------------------------------------------------------
#[test]
fn create_below_eztags() {
    let service = service();
    let create = service.new_tag_create_struct(Some(TagId(40)), "Test tag");
    let before = ModificationDate::now();
    let tag = service.create_tag(&admin(), create).unwrap();

    assert_eq!(tag.id, TagId(97));
    assert_eq!(tag.parent_tag_id, Some(TagId(40)));
    assert_eq!(tag.main_tag_id, None);
    assert_eq!(tag.depth, 4);
    assert_eq!(tag.path_string.to_string(), "/8/7/40/97/");
    assert!(tag.modification_date >= before);
    assert_eq!(tag.remote_id.len(), 32);

    assert_eq!(load(&service, 97), tag);
    assert_valid(&service);
}

#[test]
fn create_top_level_with_remote_id() {
    let service = service();
    let create = service
        .new_tag_create_struct(None, "Top")
        .with_remote_id("123456abcdef");
    let tag = service.create_tag(&admin(), create).unwrap();
    assert_eq!(tag.parent_tag_id, None);
    assert_eq!(tag.depth, 1);
    assert_eq!(tag.path_string.to_string(), "/97/");
    assert_eq!(tag.remote_id, "123456abcdef");
    assert_eq!(
        service.load_tag_by_remote_id(&admin(), "123456abcdef").unwrap().id,
        TagId(97)
    );
}

#[test]
fn create_rejects_taken_remote_id() {
    let service = service();
    let create = service
        .new_tag_create_struct(Some(TagId(40)), "Test tag")
        .with_remote_id("182be0c5cdcd5072bb1864cdee4d3d6e");
    let err = service.create_tag(&admin(), create).unwrap_err();
    assert_eq!(invalid_argument(err), "remote_id");
}

#[test]
fn create_rejects_bad_parent_and_keyword() {
    let service = service();
    let err = service
        .create_tag(&admin(), service.new_tag_create_struct(Some(TagId(999)), "x"))
        .unwrap_err();
    assert!(err.is_not_found());

    let err = service
        .create_tag(&admin(), service.new_tag_create_struct(Some(TagId(95)), "x"))
        .unwrap_err();
    assert_eq!(invalid_argument(err), "parent_tag_id");

    let err = service
        .create_tag(&admin(), service.new_tag_create_struct(Some(TagId(40)), ""))
        .unwrap_err();
    assert_eq!(invalid_argument(err), "keyword");
}

#[test]
fn create_without_remote_id_when_generation_is_off() {
    let service = service_with(TagsConfig {
        service: ServiceConfig {
            generate_remote_ids: false,
            ..ServiceConfig::default()
        },
        ..TagsConfig::default()
    });
    let err = service
        .create_tag(&admin(), service.new_tag_create_struct(Some(TagId(40)), "x"))
        .unwrap_err();
    assert_eq!(invalid_argument(err), "remote_id");

    let create = service
        .new_tag_create_struct(Some(TagId(40)), "x")
        .with_remote_id("given");
    assert!(service.create_tag(&admin(), create).is_ok());
}

#[test]
fn update_changes_only_named_fields() {
    let service = service();
    let original = load(&service, 40);
    let mut update = service.new_tag_update_struct();
    assert!(update.is_empty());
    update.keyword = Some("eztags v2".into());

    let updated = service.update_tag(&admin(), TagId(40), update).unwrap();
    assert_eq!(updated.keyword, "eztags v2");
    assert_eq!(updated.remote_id, original.remote_id);
    assert_eq!(updated.path_string, original.path_string);
    assert_eq!(updated.depth, original.depth);
    assert_eq!(updated.parent_tag_id, original.parent_tag_id);
    assert!(updated.modification_date > original.modification_date);
    assert_eq!(load(&service, 40), updated);
}

#[test]
fn update_remote_id_rules() {
    let service = service();
    let mut update = service.new_tag_update_struct();
    update.remote_id = Some("e2c420d928d4bf8ce0ff2ec19b371514".into());
    let err = service.update_tag(&admin(), TagId(40), update).unwrap_err();
    assert_eq!(invalid_argument(err), "remote_id");

    // re-using the tag's own remote id is fine
    let mut update = service.new_tag_update_struct();
    update.remote_id = Some("182be0c5cdcd5072bb1864cdee4d3d6e".into());
    assert!(service.update_tag(&admin(), TagId(40), update).is_ok());

    let err = service
        .update_tag(&admin(), TagId(999), service.new_tag_update_struct())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn add_synonym_sits_beside_main() {
    let service = service();
    let synonym = service.add_synonym(&admin(), TagId(40), "New synonym").unwrap();
    assert_eq!(synonym.id, TagId(97));
    assert_eq!(synonym.main_tag_id, Some(TagId(40)));
    assert_eq!(synonym.parent_tag_id, Some(TagId(7)));
    assert_eq!(synonym.depth, 3);
    assert_eq!(synonym.path_string.to_string(), "/8/7/97/");
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(40)).unwrap(), 1);
    // not a child of 7
    assert_eq!(ids(&service.load_tag_children(&admin(), TagId(7)).unwrap()), vec![40]);
    assert_valid(&service);
}

#[test]
fn add_synonym_rejects_synonym_and_missing_main() {
    let service = service();
    let err = service.add_synonym(&admin(), TagId(95), "again").unwrap_err();
    assert_eq!(invalid_argument(err), "main_tag_id");
    assert!(service
        .add_synonym(&admin(), TagId(999), "x")
        .unwrap_err()
        .is_not_found());
}

// -----------------------------------------------------------------------
// 3. Convert to synonym
// -----------------------------------------------------------------------
#[test]
fn convert_moves_children_and_synonyms_to_main() {
    let service = service();
    let original = load(&service, 16);
    let converted = service.convert_to_synonym(&admin(), TagId(16), TagId(40)).unwrap();

    assert_eq!(converted.id, TagId(16));
    assert_eq!(converted.main_tag_id, Some(TagId(40)));
    assert_eq!(converted.parent_tag_id, Some(TagId(7)));
    assert_eq!(converted.depth, 3);
    assert_eq!(converted.path_string.to_string(), "/8/7/16/");
    assert!(converted.modification_date > original.modification_date);

    let children = service.load_tag_children(&admin(), TagId(40)).unwrap();
    assert_eq!(ids(&children), vec![17, 18, 19, 20, 21, 22]);
    assert_eq!(load(&service, 17).path_string.to_string(), "/8/7/40/17/");
    assert_eq!(load(&service, 24).path_string.to_string(), "/8/7/40/18/24/");
    assert_eq!(load(&service, 25).depth, 5);

    let synonyms = service.load_tag_synonyms(&admin(), TagId(40)).unwrap();
    assert_eq!(ids(&synonyms), vec![16, 96, 95]);
    assert_eq!(load(&service, 95).path_string.to_string(), "/8/7/95/");

    // content stays with the converted tag
    assert_eq!(content_ids(&service, 16), vec![57, 58]);
    assert_valid(&service);
}

#[test]
fn convert_into_own_parent() {
    let service = service();
    let converted = service.convert_to_synonym(&admin(), TagId(18), TagId(16)).unwrap();
    assert_eq!(converted.parent_tag_id, None);
    assert_eq!(converted.path_string.to_string(), "/18/");
    assert_eq!(load(&service, 24).path_string.to_string(), "/16/24/");
    assert_eq!(load(&service, 25).path_string.to_string(), "/16/25/");
    assert_eq!(service.get_tag_children_count(&admin(), TagId(16)).unwrap(), 6);
    assert_valid(&service);
}

#[test]
fn convert_preconditions_in_order() {
    let service = service();
    assert!(service
        .convert_to_synonym(&admin(), TagId(999), TagId(95))
        .unwrap_err()
        .is_not_found());
    assert!(service
        .convert_to_synonym(&admin(), TagId(40), TagId(999))
        .unwrap_err()
        .is_not_found());

    let err = service.convert_to_synonym(&admin(), TagId(95), TagId(40)).unwrap_err();
    assert_eq!(invalid_argument(err), "tag");
    let err = service.convert_to_synonym(&admin(), TagId(40), TagId(95)).unwrap_err();
    assert_eq!(invalid_argument(err), "main_tag");
    let err = service.convert_to_synonym(&admin(), TagId(7), TagId(40)).unwrap_err();
    assert_eq!(invalid_argument(err), "main_tag");
    let err = service.convert_to_synonym(&admin(), TagId(7), TagId(7)).unwrap_err();
    assert_eq!(invalid_argument(err), "main_tag");
}

// -----------------------------------------------------------------------
// 4. Merge
// -----------------------------------------------------------------------
#[test]
fn merge_hands_everything_to_target() {
    let service = service();
    let target_before = load(&service, 26);
    service.merge_tags(&admin(), TagId(16), TagId(26)).unwrap();

    assert!(service.load_tag(&admin(), TagId(16)).unwrap_err().is_not_found());

    let children = service.load_tag_children(&admin(), TagId(26)).unwrap();
    assert_eq!(ids(&children), vec![17, 18, 19, 20, 21, 22]);
    assert_eq!(load(&service, 24).path_string.to_string(), "/26/18/24/");

    let synonyms = service.load_tag_synonyms(&admin(), TagId(26)).unwrap();
    assert_eq!(ids(&synonyms), vec![96, 95]);
    assert_eq!(load(&service, 95).path_string.to_string(), "/95/");

    assert_eq!(content_ids(&service, 26), vec![57, 58]);
    assert!(load(&service, 26).modification_date > target_before.modification_date);
    assert_valid(&service);
}

#[test]
fn merge_into_eztags() {
    let service = service();
    service.merge_tags(&admin(), &load(&service, 16), &load(&service, 40)).unwrap();
    assert_eq!(service.get_related_content_count(&admin(), TagId(40)).unwrap(), 2);
    assert_eq!(service.get_tag_children_count(&admin(), TagId(40)).unwrap(), 6);
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(40)).unwrap(), 2);
    assert_eq!(load(&service, 96).path_string.to_string(), "/8/7/96/");
    assert_valid(&service);
}

#[test]
fn merge_into_parent() {
    let service = service();
    service.merge_tags(&admin(), TagId(18), TagId(16)).unwrap();
    assert_eq!(load(&service, 24).path_string.to_string(), "/16/24/");
    assert_eq!(load(&service, 25).main_tag_id, Some(TagId(24)));
    assert_eq!(service.get_tag_children_count(&admin(), TagId(16)).unwrap(), 6);
    assert_valid(&service);
}

#[test]
fn merge_rejects_cycles_and_synonyms() {
    let service = service();
    let err = service.merge_tags(&admin(), TagId(8), TagId(40)).unwrap_err();
    assert_eq!(invalid_argument(err), "target_tag");
    let err = service.merge_tags(&admin(), TagId(95), TagId(40)).unwrap_err();
    assert_eq!(invalid_argument(err), "tag");
    let err = service.merge_tags(&admin(), TagId(40), TagId(96)).unwrap_err();
    assert_eq!(invalid_argument(err), "target_tag");
    assert!(service
        .merge_tags(&admin(), TagId(40), TagId(999))
        .unwrap_err()
        .is_not_found());
}

// -----------------------------------------------------------------------
// 5. Copy and move
// -----------------------------------------------------------------------
#[test]
fn copy_creates_fresh_subtree() {
    let service = service();
    let before = service.snapshot().unwrap();
    let copy = service.copy_subtree(&admin(), TagId(18), Some(TagId(40))).unwrap();

    assert_eq!(copy.id, TagId(97));
    assert_eq!(copy.keyword, "ez publish 4");
    assert_eq!(copy.path_string.to_string(), "/8/7/40/97/");
    assert_eq!(copy.depth, 4);
    assert_ne!(copy.remote_id, load(&service, 18).remote_id);

    let copied_children = service.load_tag_children(&admin(), copy.id).unwrap();
    assert_eq!(copied_children.len(), 1);
    assert_eq!(copied_children[0].keyword, "legacy stack");
    let copied_synonyms = service
        .load_tag_synonyms(&admin(), copied_children[0].id)
        .unwrap();
    assert_eq!(copied_synonyms[0].keyword, "old stack");

    // originals and their content are untouched, copies carry no content
    assert_eq!(load(&service, 18).path_string.to_string(), "/16/18/");
    assert_eq!(content_ids(&service, 24), vec![60]);
    assert!(content_ids(&service, copied_children[0].id.get()).is_empty());
    assert_eq!(service.snapshot().unwrap().tags.len(), before.tags.len() + 3);
    assert_valid(&service);
}

#[test]
fn copy_to_top_level() {
    let service = service();
    let copy = service.copy_subtree(&admin(), TagId(7), None).unwrap();
    assert_eq!(copy.parent_tag_id, None);
    assert_eq!(copy.depth, 1);
    assert_eq!(copy.path_string.to_string(), "/97/");
    let child = &service.load_tag_children(&admin(), copy.id).unwrap()[0];
    assert_eq!(child.path_string.to_string(), "/97/98/");
}

#[test]
fn copy_preconditions() {
    let service = service();
    let err = service.copy_subtree(&admin(), TagId(7), Some(TagId(8))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.copy_subtree(&admin(), TagId(7), Some(TagId(40))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.copy_subtree(&admin(), TagId(8), None).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.copy_subtree(&admin(), TagId(95), Some(TagId(8))).unwrap_err();
    assert_eq!(invalid_argument(err), "tag");
    let err = service.copy_subtree(&admin(), TagId(7), Some(TagId(95))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    assert!(service
        .copy_subtree(&admin(), TagId(7), Some(TagId(999)))
        .unwrap_err()
        .is_not_found());
}

#[test]
fn move_cascades_paths_and_stamps_only_the_root() {
    let service = service();
    let seven = load(&service, 7);
    let eztags = load(&service, 40);

    let moved = service.move_subtree(&admin(), TagId(7), Some(TagId(16))).unwrap();
    assert_eq!(moved.parent_tag_id, Some(TagId(16)));
    assert_eq!(moved.depth, 2);
    assert_eq!(moved.path_string.to_string(), "/16/7/");
    assert!(moved.modification_date > seven.modification_date);

    let child = load(&service, 40);
    assert_eq!(child.path_string.to_string(), "/16/7/40/");
    assert_eq!(child.depth, 3);
    assert_eq!(child.modification_date, eztags.modification_date);
    assert_eq!(service.get_tag_children_count(&admin(), TagId(8)).unwrap(), 0);
    assert_valid(&service);
}

#[test]
fn move_carries_synonyms_along() {
    let service = service();
    service.move_subtree(&admin(), TagId(16), Some(TagId(40))).unwrap();
    let synonym = load(&service, 95);
    assert_eq!(synonym.parent_tag_id, Some(TagId(40)));
    assert_eq!(synonym.depth, 4);
    assert_eq!(synonym.path_string.to_string(), "/8/7/40/95/");
    assert_eq!(load(&service, 25).path_string.to_string(), "/8/7/40/16/18/25/");
    assert_valid(&service);

    service.move_subtree(&admin(), TagId(16), None).unwrap();
    assert_eq!(load(&service, 96).path_string.to_string(), "/96/");
    assert_valid(&service);
}

#[test]
fn move_preconditions() {
    let service = service();
    let err = service.move_subtree(&admin(), TagId(7), Some(TagId(8))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.move_subtree(&admin(), TagId(7), Some(TagId(40))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.move_subtree(&admin(), TagId(7), Some(TagId(7))).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.move_subtree(&admin(), TagId(16), None).unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
    let err = service.move_subtree(&admin(), TagId(95), Some(TagId(8))).unwrap_err();
    assert_eq!(invalid_argument(err), "tag");
    assert!(service
        .move_subtree(&admin(), TagId(999), Some(TagId(8)))
        .unwrap_err()
        .is_not_found());
}

// -----------------------------------------------------------------------
// 6. Delete
// -----------------------------------------------------------------------
#[test]
fn delete_removes_subtree_synonyms_and_links() {
    let service = service();
    assert_eq!(service.get_tag_children_count(&admin(), TagId(16)).unwrap(), 6);
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(16)).unwrap(), 2);

    service.delete_tag(&admin(), TagId(16)).unwrap();
    for id in [16, 17, 18, 19, 20, 21, 22, 24, 25, 95, 96] {
        let err = service.load_tag(&admin(), TagId(id)).unwrap_err();
        assert!(err.is_not_found(), "tag {id} survived");
    }
    let snapshot = service.snapshot().unwrap();
    assert_eq!(ids(&snapshot.tags), vec![7, 8, 26, 40]);
    assert!(snapshot.content.is_empty());
    assert_valid(&service);
}

#[test]
fn delete_synonym_leaves_main() {
    let service = service();
    service.delete_tag(&admin(), TagId(95)).unwrap();
    assert_eq!(service.get_tag_synonym_count(&admin(), TagId(16)).unwrap(), 1);
    assert_eq!(content_ids(&service, 16), vec![57, 58]);
    assert!(service.delete_tag(&admin(), TagId(95)).unwrap_err().is_not_found());
}

// -----------------------------------------------------------------------
// 7. Authorization
// -----------------------------------------------------------------------
#[test]
fn anonymous_is_denied_everywhere_without_side_effects() {
    let service = service();
    let anonymous = Actor::anonymous();
    let before = service.snapshot().unwrap();

    let results: Vec<ServiceResult<()>> = vec![
        service.load_tag(&anonymous, TagId(40)).map(drop),
        service
            .load_tag_by_remote_id(&anonymous, "182be0c5cdcd5072bb1864cdee4d3d6e")
            .map(drop),
        service.load_tag_children(&anonymous, TagId(16)).map(drop),
        service.get_tag_children_count(&anonymous, TagId(16)).map(drop),
        service.load_tag_synonyms(&anonymous, TagId(16)).map(drop),
        service.get_tag_synonym_count(&anonymous, TagId(16)).map(drop),
        service.get_related_content(&anonymous, TagId(16)).map(drop),
        service.get_related_content_count(&anonymous, TagId(16)).map(drop),
        service.load_root_tags(&anonymous).map(drop),
        service.verify(&anonymous).map(drop),
        service
            .create_tag(&anonymous, TagCreateStruct::new(Some(TagId(40)), "x"))
            .map(drop),
        service
            .update_tag(&anonymous, TagId(40), TagUpdateStruct {
                keyword: Some("x".into()),
                remote_id: None,
            })
            .map(drop),
        service.add_synonym(&anonymous, TagId(40), "x").map(drop),
        service.convert_to_synonym(&anonymous, TagId(26), TagId(40)).map(drop),
        service.merge_tags(&anonymous, TagId(26), TagId(40)),
        service.copy_subtree(&anonymous, TagId(7), Some(TagId(16))).map(drop),
        service.move_subtree(&anonymous, TagId(7), Some(TagId(16))).map(drop),
        service.delete_tag(&anonymous, TagId(16)),
        service.delete_tag(&anonymous, TagId(95)),
    ];
    for (i, result) in results.into_iter().enumerate() {
        let err = result.unwrap_err();
        assert!(err.is_unauthorized(), "call {i}: {err:?}");
    }
    assert!(service.load_tags_by_keyword(&anonymous, "eztags").unwrap().is_empty());
    assert_eq!(service.snapshot().unwrap(), before);

    // a denied create does not consume an id
    let tag = service
        .create_tag(&admin(), TagCreateStruct::new(Some(TagId(40)), "x"))
        .unwrap();
    assert_eq!(tag.id, TagId(97));
}

#[test]
fn existence_then_structure_then_authorization() {
    let service = service();
    let anonymous = Actor::anonymous();
    assert!(service.load_tag(&anonymous, TagId(999)).unwrap_err().is_not_found());
    assert!(service
        .move_subtree(&anonymous, TagId(7), Some(TagId(999)))
        .unwrap_err()
        .is_not_found());
    assert!(service
        .move_subtree(&anonymous, TagId(7), Some(TagId(8)))
        .unwrap_err()
        .is_invalid_argument());
    assert!(service
        .merge_tags(&anonymous, TagId(8), TagId(40))
        .unwrap_err()
        .is_invalid_argument());
    assert!(service
        .load_tag_synonyms(&anonymous, TagId(95))
        .unwrap_err()
        .is_invalid_argument());
    let err = service
        .move_subtree(&anonymous, TagId(7), Some(TagId(16)))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Unauthorized {
            operation: TagOperation::Edit,
            ..
        }
    ));
}

#[test]
fn subtree_editor_needs_both_ends_of_a_move() {
    let service = service_with(editor_config());
    let editor = editor();
    let before = service.snapshot().unwrap();

    let err = service
        .move_subtree(&editor, TagId(18), Some(TagId(26)))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Unauthorized {
            operation: TagOperation::Add,
            ..
        }
    ));
    assert!(service.move_subtree(&editor, TagId(18), None).unwrap_err().is_unauthorized());
    assert!(service.move_subtree(&editor, TagId(7), Some(TagId(16))).unwrap_err().is_unauthorized());
    assert_eq!(service.snapshot().unwrap(), before);

    let moved = service.move_subtree(&editor, TagId(18), Some(TagId(17))).unwrap();
    assert_eq!(moved.path_string.to_string(), "/16/17/18/");
    // editors may not delete
    assert!(service.delete_tag(&editor, TagId(24)).unwrap_err().is_unauthorized());
}

#[test]
fn copy_requires_reading_the_source() {
    let service = service_with(editor_config());
    let editor = editor();
    let before = service.snapshot().unwrap();

    // eztags lies outside the editor's subtree; the target inside it is fine
    let err = service
        .copy_subtree(&editor, TagId(40), Some(TagId(17)))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Unauthorized {
            operation: TagOperation::Read,
            ..
        }
    ));
    assert_eq!(service.snapshot().unwrap(), before);

    let copy = service.copy_subtree(&editor, TagId(18), Some(TagId(17))).unwrap();
    assert_eq!(copy.parent_tag_id, Some(TagId(17)));
    assert_valid(&service);
}

#[test]
fn keyword_lookup_filters_unreadable_tags() {
    let service = service_with(editor_config());
    service
        .create_tag(&admin(), TagCreateStruct::new(Some(TagId(26)), "cms"))
        .unwrap();
    assert_eq!(service.load_tags_by_keyword(&admin(), "cms").unwrap().len(), 2);
    assert_eq!(ids(&service.load_tags_by_keyword(&editor(), "cms").unwrap()), vec![16]);
}

#[test]
fn read_only_gate_blocks_mutations() {
    let service = service_with(TagsConfig {
        gate: GateConfig {
            read_only: true,
            ..GateConfig::default()
        },
        ..TagsConfig::default()
    });
    assert!(service.load_tag(&admin(), TagId(40)).is_ok());
    assert!(service.delete_tag(&admin(), TagId(40)).unwrap_err().is_unauthorized());
}

struct BrokenGate;

impl AuthorizationGate for BrokenGate {
    fn check(&self, _request: &AccessRequest<'_>) -> Result<Decision, tagtree_gate::GateError> {
        Err(tagtree_gate::GateError::Config("policy source unavailable".into()))
    }
}

#[test]
fn gate_failures_surface_as_gate_errors() {
    let (store, links) = Fixture::sample().unwrap().into_backends().unwrap();
    let service = TagsService::new(Arc::new(store), Arc::new(links), Arc::new(BrokenGate));
    let before = service.snapshot().unwrap();
    let err = service.delete_tag(&admin(), TagId(16)).unwrap_err();
    assert!(matches!(err, ServiceError::Gate(_)), "{err:?}");
    assert_eq!(service.snapshot().unwrap(), before);
}

#[test]
fn debug_hides_backends() {
    let debug = format!("{:?}", service());
    assert!(debug.starts_with("TagsService"));
    assert!(debug.contains("max_keyword_length"));
}

// -----------------------------------------------------------------------
// 8. Concurrent writers and link failures
// -----------------------------------------------------------------------

/// Allows everything. The first check runs `rival` before answering, which
/// lands a write between the caller's reads and its commit.
struct InterleavingGate {
    rival: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl AuthorizationGate for InterleavingGate {
    fn check(&self, _request: &AccessRequest<'_>) -> Result<Decision, GateError> {
        let rival = self.rival.lock().unwrap().take();
        if let Some(write) = rival {
            write();
        }
        Ok(Decision::Allow)
    }
}

/// Two services over the same backends. The first one's gate lets
/// `rival_write` run on the second service during its first check.
fn interleaved(
    rival_write: impl FnOnce(&TagsService) + Send + 'static,
) -> (TagsService, Arc<TagsService>) {
    let (store, links) = Fixture::sample().unwrap().into_backends().unwrap();
    let store: Arc<dyn TagStore> = Arc::new(store);
    let links: Arc<dyn ContentLinkIndex> = Arc::new(links);
    let rival = Arc::new(TagsService::new(
        Arc::clone(&store),
        Arc::clone(&links),
        Arc::new(TagGate::default()),
    ));
    let other = Arc::clone(&rival);
    let gate = InterleavingGate {
        rival: Mutex::new(Some(Box::new(move || rival_write(&*other)))),
    };
    (TagsService::new(store, links, Arc::new(gate)), rival)
}

#[test]
fn racing_moves_cannot_build_a_cycle() {
    let (service, rival) = interleaved(|rival| {
        rival
            .move_subtree(&admin(), TagId(16), Some(TagId(40)))
            .unwrap();
    });

    let err = service
        .move_subtree(&admin(), TagId(7), Some(TagId(17)))
        .unwrap_err();
    assert!(err.is_conflict(), "{err:?}");
    assert_eq!(load(&rival, 16).path_string.to_string(), "/8/7/40/16/");
    assert_eq!(load(&rival, 7).parent_tag_id, Some(TagId(8)));
    assert_valid(&rival);

    // retrying against the new tree is refused up front
    let err = service
        .move_subtree(&admin(), TagId(7), Some(TagId(17)))
        .unwrap_err();
    assert_eq!(invalid_argument(err), "target_parent_tag");
}

#[test]
fn create_under_a_concurrently_deleted_parent_conflicts() {
    let (service, rival) = interleaved(|rival| {
        rival.delete_tag(&admin(), TagId(40)).unwrap();
    });

    let err = service
        .create_tag(&admin(), TagCreateStruct::new(Some(TagId(40)), "orphan"))
        .unwrap_err();
    assert!(err.is_conflict(), "{err:?}");
    assert!(service.load_tags_by_keyword(&admin(), "orphan").unwrap().is_empty());
    assert_valid(&rival);
}

/// Link index whose bulk updates fail. `remove_all` fails only for
/// `fail_on` when set, and always otherwise.
struct FailingLinks {
    inner: InMemoryContentIndex,
    fail_on: Option<TagId>,
}

impl FailingLinks {
    fn offline() -> StoreError {
        StoreError::Poisoned("link index offline".into())
    }
}

impl ContentLinkIndex for FailingLinks {
    fn list_content_for(&self, tag: TagId) -> StoreResult<Vec<ContentRef>> {
        self.inner.list_content_for(tag)
    }

    fn link(&self, tag: TagId, content: ContentRef) -> StoreResult<bool> {
        self.inner.link(tag, content)
    }

    fn reassign(&self, _from: TagId, _to: TagId) -> StoreResult<()> {
        Err(Self::offline())
    }

    fn remove_all(&self, tag: TagId) -> StoreResult<usize> {
        match self.fail_on {
            Some(failing) if failing != tag => self.inner.remove_all(tag),
            _ => Err(Self::offline()),
        }
    }

    fn all_links(&self) -> StoreResult<Vec<(TagId, ContentRef)>> {
        self.inner.all_links()
    }
}

fn with_failing_links(fail_on: Option<TagId>) -> TagsService {
    let (store, links) = Fixture::sample().unwrap().into_backends().unwrap();
    TagsService::new(
        Arc::new(store),
        Arc::new(FailingLinks {
            inner: links,
            fail_on,
        }),
        Arc::new(TagGate::default()),
    )
}

#[test]
fn merge_is_rolled_back_when_links_cannot_move() {
    let service = with_failing_links(None);
    let before = service.snapshot().unwrap();

    let err = service.merge_tags(&admin(), TagId(16), TagId(40)).unwrap_err();
    assert!(matches!(err, ServiceError::Store(StoreError::Poisoned(_))), "{err:?}");

    assert_eq!(load(&service, 16).keyword, "cms");
    assert_eq!(content_ids(&service, 16), vec![57, 58]);
    assert_eq!(service.get_tag_children_count(&admin(), TagId(16)).unwrap(), 6);
    assert_eq!(service.snapshot().unwrap(), before);
    assert_valid(&service);
}

#[test]
fn delete_is_rolled_back_when_links_cannot_be_dropped() {
    // the failure hits part way through, after other links may be gone
    let service = with_failing_links(Some(TagId(24)));
    let before = service.snapshot().unwrap();

    let err = service.delete_tag(&admin(), TagId(16)).unwrap_err();
    assert!(matches!(err, ServiceError::Store(StoreError::Poisoned(_))), "{err:?}");

    assert_eq!(load(&service, 24).path_string.to_string(), "/16/18/24/");
    assert_eq!(content_ids(&service, 16), vec![57, 58]);
    assert_eq!(content_ids(&service, 24), vec![60]);
    assert_eq!(service.snapshot().unwrap(), before);
    assert_valid(&service);

    // subtrees without the failing tag still delete
    service.delete_tag(&admin(), TagId(40)).unwrap();
    assert!(service.load_tag(&admin(), TagId(40)).unwrap_err().is_not_found());
}

// -----------------------------------------------------------------------
// 9. Properties
// -----------------------------------------------------------------------
const MOVABLE: [u64; 12] = [7, 8, 16, 17, 18, 19, 20, 21, 22, 24, 26, 40];

proptest! {
    #[test]
    fn random_moves_keep_the_forest_valid(
        moves in prop::collection::vec(
            (0..MOVABLE.len(), prop::option::of(0..MOVABLE.len())),
            1..16,
        )
    ) {
        let service = service();
        for (tag, target) in moves {
            let tag = TagId(MOVABLE[tag]);
            let target = target.map(|i| TagId(MOVABLE[i]));
            match service.move_subtree(&admin(), tag, target) {
                Ok(moved) => prop_assert_eq!(moved.parent_tag_id, target),
                Err(err) => prop_assert!(err.is_invalid_argument(), "{:?}", err),
            }
            let report = service.verify(&admin()).unwrap();
            prop_assert!(report.is_valid(), "{:?}", report.violations);
            prop_assert_eq!(report.tag_count, 15);
        }
    }

    #[test]
    fn random_copies_and_deletes_keep_the_forest_valid(
        steps in prop::collection::vec(
            (any::<bool>(), 0..MOVABLE.len(), prop::option::of(0..MOVABLE.len())),
            1..8,
        )
    ) {
        let service = service();
        for (copy, tag, target) in steps {
            let tag = TagId(MOVABLE[tag]);
            let result = if copy {
                service
                    .copy_subtree(&admin(), tag, target.map(|i| TagId(MOVABLE[i])))
                    .map(drop)
            } else {
                service.delete_tag(&admin(), tag)
            };
            if let Err(err) = result {
                prop_assert!(err.is_not_found() || err.is_invalid_argument(), "{:?}", err);
            }
            let report = service.verify(&admin()).unwrap();
            prop_assert!(report.is_valid(), "{:?}", report.violations);
        }
    }
}
