use std::rc::Rc;

use hsdat_core::{DatBuilder, DatError, DatFile, RecordLayout, Value, HEADER_SIZE};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const HS: usize = HEADER_SIZE;

fn words(dat: &DatFile, table: hsdat_core::TableView) -> Vec<u32> {
    table
        .records(dat)
        .unwrap()
        .into_iter()
        .map(|r| r[0].as_u32().unwrap())
        .collect()
}

fn word_layout() -> Rc<RecordLayout> {
    Rc::new(RecordLayout::parse(">I", &["value"]).unwrap())
}

#[test]
fn insert_moves_only_pointers_at_or_after_location() {
    let mut b = DatBuilder::new(0x80);
    b.put_pointer(0x10, 0x08).put_pointer(0x40, 0x60).root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let before = dat.file_size().unwrap();

    dat.insert(HS + 0x20, 8).unwrap();

    assert_eq!(dat.pointer_slots().unwrap(), vec![0x10, 0x48]);
    assert_eq!(dat.read_u32(HS + 0x10).unwrap(), 0x08);
    assert_eq!(dat.read_u32(HS + 0x48).unwrap(), 0x68);
    assert_eq!(dat.data_size().unwrap(), 0x88);
    assert_eq!(dat.file_size().unwrap(), before + 8);
    assert_eq!(dat.title(0).unwrap(), "test");
    dat.check_invariants().unwrap();
}

#[test]
fn zero_edit_is_a_no_op() {
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x20).root(0, "test");
    let bytes = b.build();
    let mut dat = DatFile::from_bytes(bytes.clone()).unwrap();
    dat.insert(HS + 0x10, 0).unwrap();
    assert_eq!(dat.as_bytes(), &bytes[..]);
}

#[test]
fn insert_then_remove_restores_bytes() {
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x20)
        .put_pointer(0x24, 0x10)
        .put_u32(0x10, 0xCAFE_F00D)
        .root(0x10, "test");
    let bytes = b.build();
    let mut dat = DatFile::from_bytes(bytes.clone()).unwrap();

    dat.insert_bytes(HS + 0x10, &[0xAB; 12]).unwrap();
    assert_eq!(dat.read_u32(HS).unwrap(), 0x2C);
    assert_eq!(dat.read_pointer(HS + 0x30).unwrap(), HS + 0x1C);
    assert_eq!(dat.read_u32(HS + 0x1C).unwrap(), 0xCAFE_F00D);

    dat.insert(HS + 0x10, -12).unwrap();
    assert_eq!(dat.as_bytes(), &bytes[..]);
}

#[test]
fn edit_outside_buffer_is_rejected() {
    let mut b = DatBuilder::new(0x20);
    b.root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let size = dat.as_bytes().len();
    assert!(matches!(dat.insert(size + 4, 4), Err(DatError::OutOfBounds { .. })));
    assert!(matches!(dat.insert(size - 4, -8), Err(DatError::OutOfBounds { .. })));
}

#[test]
fn pointer_table_insert_leaves_data_pointers_alone() {
    // Slot 0x04 points at the end of the pointer table, where the root nodes
    // start. Growing the table from inside moves the nodes but not that value.
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x10)
        .put_pointer(0x04, 0x4C)
        .put_pointer(0x20, 0x30)
        .root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let roots = dat.root_nodes().start(&dat).unwrap();

    dat.add_pointer(0x10).unwrap();

    assert_eq!(dat.pointer_slots().unwrap(), vec![0x00, 0x04, 0x10, 0x20]);
    assert_eq!(dat.pointer_count().unwrap(), 4);
    assert_eq!(dat.root_nodes().start(&dat).unwrap(), roots + 4);
    assert_eq!(dat.read_u32(HS + 0x04).unwrap(), 0x4C);
    assert_eq!(dat.data_size().unwrap(), 0x40);

    // the same value does follow an edit in the data section
    dat.insert(HS + 0x30, 4).unwrap();
    assert_eq!(dat.read_u32(HS + 0x04).unwrap(), 0x50);
    assert_eq!(dat.read_u32(HS + 0x20).unwrap(), 0x34);
}

#[test]
fn add_and_delete_pointer() {
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x08, 0x20).root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();

    dat.write_u32(HS + 0x30, 0x10).unwrap();
    dat.add_pointer(0x30).unwrap();
    dat.add_pointer(0x00).unwrap();
    assert_eq!(dat.pointer_slots().unwrap(), vec![0x00, 0x08, 0x30]);
    dat.check_invariants().unwrap();

    dat.delete_pointer(0x08).unwrap();
    assert_eq!(dat.pointer_slots().unwrap(), vec![0x00, 0x30]);
    assert_eq!(dat.pointer_count().unwrap(), 2);
    assert!(matches!(dat.delete_pointer(0x08), Err(DatError::PointerNotFound(0x08))));
    assert_eq!(dat.title(0).unwrap(), "test");
    dat.check_invariants().unwrap();
}

#[test]
fn table_view_edits() {
    let mut b = DatBuilder::new(0x40);
    b.put_u32(0x10, 5).put_u32(0x14, 9).put_pointer(0x30, 0x38).root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let table = dat.register_table(HS + 0x10, 2, word_layout());

    assert_eq!(table.insert_sorted(&mut dat, &[Value::U32(7)]).unwrap(), 1);
    assert_eq!(words(&dat, table), vec![5, 7, 9]);
    assert_eq!(dat.pointer_slots().unwrap(), vec![0x34]);
    assert_eq!(dat.read_u32(HS + 0x34).unwrap(), 0x3C);

    assert_eq!(table.insert_sorted(&mut dat, &[Value::U32(20)]).unwrap(), 3);
    table.insert(&mut dat, 0, &[Value::U32(1)]).unwrap();
    assert_eq!(table.start(&dat).unwrap(), HS + 0x10);
    assert_eq!(words(&dat, table), vec![1, 5, 7, 9, 20]);

    table.delete(&mut dat, 0).unwrap();
    assert_eq!(table.delete_by_value(&mut dat, &[Value::U32(9)]).unwrap(), 2);
    assert_eq!(words(&dat, table), vec![5, 7, 20]);
    assert!(matches!(
        table.delete_by_value(&mut dat, &[Value::U32(99)]),
        Err(DatError::ValueNotFound(_))
    ));
    assert!(matches!(
        table.insert(&mut dat, 9, &[Value::U32(0)]),
        Err(DatError::IndexOutOfRange { index: 9, len: 3 })
    ));
    assert!(matches!(table.get(&dat, 3), Err(DatError::IndexOutOfRange { .. })));

    assert_eq!(dat.data_size().unwrap(), 0x40 + 4);
    assert_eq!(dat.read_u32(HS + 0x34).unwrap(), 0x3C);
    dat.check_invariants().unwrap();
}

#[test]
fn pointers_to_a_table_head_stay_on_the_head() {
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x30)
        .put_pointer(0x04, 0x34)
        .put_u32(0x30, 5)
        .put_u32(0x34, 9)
        .root(0x30, "table");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let table = dat.register_table(HS + 0x30, 2, word_layout());

    table.insert(&mut dat, 0, &[Value::U32(1)]).unwrap();
    assert_eq!(table.start(&dat).unwrap(), HS + 0x30);
    assert_eq!(dat.read_pointer(HS).unwrap(), HS + 0x30);
    assert_eq!(dat.read_pointer(HS + 0x04).unwrap(), HS + 0x38);
    assert_eq!(dat.root_nodes().get_field(&dat, 0, "pointer").unwrap(), Value::U32(0x30));

    // the file agrees with the view once reopened
    let reopened = DatFile::from_bytes(dat.as_bytes().to_vec()).unwrap();
    let head = reopened.read_pointer(HS).unwrap();
    assert_eq!(reopened.read_u32(head).unwrap(), 1);
    assert_eq!(reopened.read_u32(reopened.read_pointer(HS + 0x04).unwrap()).unwrap(), 9);

    table.delete(&mut dat, 0).unwrap();
    assert_eq!(dat.read_pointer(HS).unwrap(), HS + 0x30);
    assert_eq!(dat.read_u32(HS + 0x30).unwrap(), 5);
    assert_eq!(dat.read_pointer(HS + 0x04).unwrap(), HS + 0x34);
    assert_eq!(dat.read_u32(HS + 0x34).unwrap(), 9);
    assert_eq!(dat.title(0).unwrap(), "table");
    dat.check_invariants().unwrap();
}

#[test]
fn pointer_table_delete_leaves_data_pointers_alone() {
    // Slot 0x04 points at the end of the pointer table. Removing a later row
    // from inside the table must not pull that value back.
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x10)
        .put_pointer(0x04, 0x4C)
        .put_pointer(0x20, 0x30)
        .root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let roots = dat.root_nodes().start(&dat).unwrap();

    dat.delete_pointer(0x20).unwrap();

    assert_eq!(dat.pointer_slots().unwrap(), vec![0x00, 0x04]);
    assert_eq!(dat.pointer_count().unwrap(), 2);
    assert_eq!(dat.root_nodes().start(&dat).unwrap(), roots - 4);
    assert_eq!(dat.read_u32(HS + 0x04).unwrap(), 0x4C);
    assert_eq!(dat.read_u32(HS + 0x00).unwrap(), 0x10);
    assert_eq!(dat.read_u32(HS + 0x20).unwrap(), 0x30);
    assert_eq!(dat.data_size().unwrap(), 0x40);
    assert_eq!(dat.title(0).unwrap(), "test");
}

#[test]
fn empty_table_accepts_first_record() {
    let mut b = DatBuilder::new(0x20);
    b.root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let table = dat.register_table(HS + 0x10, 0, word_layout());
    let after = dat.register_struct(HS + 0x10, word_layout());

    assert_eq!(table.insert_sorted(&mut dat, &[Value::U32(3)]).unwrap(), 0);
    assert_eq!(words(&dat, table), vec![3]);
    assert_eq!(table.start(&dat).unwrap(), HS + 0x10);
    // other views at the edit point move past the new record
    assert_eq!(after.start(&dat).unwrap(), HS + 0x14);
}

#[test]
fn released_and_foreign_views_are_stale() {
    let mut b = DatBuilder::new(0x20);
    b.put_u32(0x04, 42).root(0, "test");
    let bytes = b.build();
    let mut dat = DatFile::from_bytes(bytes.clone()).unwrap();
    let other = DatFile::from_bytes(bytes).unwrap();

    let view = dat.register_struct(HS + 0x04, word_layout());
    assert_eq!(view.get_field(&dat, "value").unwrap(), Value::U32(42));
    assert!(matches!(view.get(&other), Err(DatError::StaleView(_))));

    dat.release_view(view.id()).unwrap();
    assert!(matches!(view.get(&dat), Err(DatError::StaleView(_))));
    assert!(matches!(dat.release_view(view.id()), Err(DatError::StaleView(_))));
}

#[test]
fn struct_view_follows_edits() {
    let mut b = DatBuilder::new(0x20);
    b.put_u32(0x10, 1).put_f32(0x14, 2.5).root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    let layout = Rc::new(RecordLayout::parse(">If", &["count", "scale"]).unwrap());
    let view = dat.register_struct(HS + 0x10, layout);

    dat.insert(HS + 0x04, 8).unwrap();
    assert_eq!(view.start(&dat).unwrap(), HS + 0x18);
    assert_eq!(view.get_field(&dat, "scale").unwrap(), Value::F32(2.5));

    view.set_field(&mut dat, "count", Value::U32(3)).unwrap();
    assert_eq!(dat.read_u32(HS + 0x18).unwrap(), 3);
}

#[test]
fn alignment_is_kept_across_edits() {
    let mut b = DatBuilder::new(0x80);
    b.put_pointer(0x00, 0x40)
        .put_u32(0x38, 0x1234_5678)
        .put_u32(0x3C, 0xDEAD_BEEF)
        .put_bytes(0x40, &[0x11; 0x10])
        .root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    dat.register_alignment(HS + 0x40, 32).unwrap();

    // four bytes before the target: the padding word is dropped
    dat.insert(HS + 0x10, 4).unwrap();
    assert_eq!(dat.alignment().entries()[0].target, 0x60);
    assert_eq!(dat.read_pointer(HS).unwrap(), 0x60);
    assert_eq!(dat.read_u32(0x5C).unwrap(), 0x1234_5678);
    assert_eq!(dat.data_size().unwrap(), 0x80);

    // four more: the target moves to the next boundary
    dat.insert(HS + 0x10, 4).unwrap();
    assert_eq!(dat.alignment().entries()[0].target, 0x80);
    assert_eq!(dat.read_pointer(HS).unwrap(), 0x80);
    assert_eq!(dat.read_u32(0x64).unwrap(), 0xDEAD_BEEF);
    assert_eq!(dat.read_u32(0x7C).unwrap(), 0xDEAD_BEEF);
    assert_eq!(dat.store().read_at(0x80, 4).unwrap(), &[0x11; 4]);
    assert_eq!(dat.data_size().unwrap(), 0x80 + 0x20);
    dat.check_invariants().unwrap();
}

#[test]
fn alignment_must_be_a_power_of_two() {
    let mut b = DatBuilder::new(0x20);
    b.root(0, "test");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    assert!(dat.register_alignment(HS, 24).is_err());
    assert!(dat.register_alignment(HS, 2).is_err());
    dat.register_alignment(HS, 32).unwrap();
}

#[test]
fn next_target_and_chain() {
    let mut b = DatBuilder::new(0x40);
    b.put_pointer(0x00, 0x10)
        .put_pointer(0x10, 0x20)
        .put_pointer(0x24, 0x30)
        .root(0, "test");
    let dat = DatFile::from_bytes(b.build()).unwrap();

    assert_eq!(dat.next_target(HS + 0x10).unwrap(), Some(HS + 0x20));
    assert_eq!(dat.next_target(HS + 0x30).unwrap(), None);
    assert_eq!(dat.index_offset().unwrap(), HS);
    assert_eq!(dat.follow_chain(&[HS, 0]).unwrap(), HS + 0x20);
    assert_eq!(dat.follow_chain(&[HS, 0, 4]).unwrap(), HS + 0x30);
}

#[test]
fn malformed_containers_are_rejected() {
    assert!(matches!(
        DatFile::from_bytes(vec![0; 0x10]),
        Err(DatError::MalformedContainer(_))
    ));

    let mut b = DatBuilder::new(0x20);
    b.put_pointer(0x00, 0x10).root(0, "test");
    let mut bytes = b.build();
    // pointer count past end of file
    bytes[0x0B] = 0x40;
    assert!(matches!(DatFile::from_bytes(bytes), Err(DatError::MalformedContainer(_))));
}

#[test]
fn random_edits_keep_pointers_on_target() {
    const MARKER: u32 = 0xA000_0000;
    const POINTERS: usize = 12;
    let mut rng = StdRng::seed_from_u64(0x5EED);

    let mut word_slots: Vec<usize> = (0..0x40).map(|w| w * 4).collect();
    word_slots.shuffle(&mut rng);
    let mut b = DatBuilder::new(0x100);
    for i in 0..POINTERS {
        let (slot, target) = (word_slots[2 * i], word_slots[2 * i + 1]);
        b.put_pointer(slot, target).put_u32(target, MARKER + i as u32);
    }
    b.root(0, "random");
    let original = b.build();
    let mut dat = DatFile::from_bytes(original.clone()).unwrap();

    let check = |dat: &DatFile| {
        dat.check_invariants().unwrap();
        let mut seen: Vec<u32> = dat
            .pointer_targets()
            .unwrap()
            .into_iter()
            .map(|t| dat.read_u32(t).unwrap() - MARKER)
            .collect();
        seen.sort();
        assert_eq!(seen, (0..POINTERS as u32).collect::<Vec<_>>());
    };

    let mut edits = Vec::new();
    for _ in 0..40 {
        let data_end = dat.data_end().unwrap();
        let location = HS + 4 * rng.gen_range(0..=(data_end - HS) / 4);
        let amount = 4 * rng.gen_range(1..=4) as isize;
        dat.insert(location, amount).unwrap();
        edits.push((location, amount));
        check(&dat);
    }

    for (location, amount) in edits.into_iter().rev() {
        dat.insert(location, -amount).unwrap();
        check(&dat);
    }
    assert_eq!(dat.as_bytes(), &original[..]);
}

#[test]
fn random_pointer_registration_stays_sorted() {
    let mut rng = StdRng::seed_from_u64(0x50127);
    let mut b = DatBuilder::new(0x100);
    b.root(0, "sorted");
    let mut dat = DatFile::from_bytes(b.build()).unwrap();

    let mut slots: Vec<u32> = (0..0x40).map(|w| w * 4).collect();
    slots.shuffle(&mut rng);
    let (added, kept) = slots.split_at(24);
    for slot in added {
        dat.add_pointer(*slot).unwrap();
        let table = dat.pointer_slots().unwrap();
        assert!(table.windows(2).all(|w| w[0] < w[1]));
        dat.check_invariants().unwrap();
    }
    assert_eq!(dat.pointer_count().unwrap(), 24);
    assert_eq!(dat.data_size().unwrap(), 0x100);

    let mut expected = added.to_vec();
    expected.sort();
    assert_eq!(dat.pointer_slots().unwrap(), expected);
    assert!(matches!(dat.delete_pointer(kept[0]), Err(DatError::PointerNotFound(_))));

    for slot in added.iter().rev() {
        dat.delete_pointer(*slot).unwrap();
    }
    assert_eq!(dat.pointer_count().unwrap(), 0);
    assert_eq!(dat.title(0).unwrap(), "sorted");
}

#[test]
fn random_edits_keep_images_aligned() {
    const MARKER: u32 = 0x1234_5678;
    let mut rng = StdRng::seed_from_u64(0xA11C);

    // zero filler 0x08..0xB8, marker word, one padding word, a 32-byte aligned
    // image at 0xC0, a pointer back to the marker, then padding and a
    // 16-byte aligned image at 0x100
    let mut b = DatBuilder::new(0x120);
    b.put_pointer(0x00, 0xC0)
        .put_pointer(0x04, 0x100)
        .put_u32(0xB8, MARKER)
        .put_u32(0xBC, 0xDEAD_BEEF)
        .put_bytes(0xC0, &[0x11; 0x20])
        .put_pointer(0xE0, 0xB8)
        .put_bytes(0x100, &[0x22; 0x20])
        .root(0, "images");
    for pad in (0xE4..0x100).step_by(4) {
        b.put_u32(pad, 0xDEAD_BEEF);
    }
    let mut dat = DatFile::from_bytes(b.build()).unwrap();
    dat.register_alignment(HS + 0xC0, 32).unwrap();
    dat.register_alignment(HS + 0x100, 16).unwrap();

    for _ in 0..60 {
        let marker = dat.pointer_targets().unwrap()[2];
        let filler = marker - (HS + 8);
        if filler > 0 && rng.gen_bool(0.4) {
            let amount = 4 * rng.gen_range(1..=(filler / 4).min(8));
            dat.insert(HS + 8, -(amount as isize)).unwrap();
        } else {
            let location = HS + 8 + 4 * rng.gen_range(0..=filler / 4);
            let amount = 4 * rng.gen_range(1..=8) as isize;
            dat.insert(location, amount).unwrap();
        }

        dat.check_invariants().unwrap();
        let constraints = dat.alignment().entries().to_vec();
        for c in &constraints {
            assert_eq!(c.target % c.alignment, 0, "0x{:X} lost its alignment", c.target);
        }
        let targets = dat.pointer_targets().unwrap();
        assert_eq!(targets[0], constraints[0].target);
        assert_eq!(targets[1], constraints[1].target);
        assert_eq!(dat.store().read_at(targets[0], 4).unwrap(), &[0x11; 4]);
        assert_eq!(dat.store().read_at(targets[1], 4).unwrap(), &[0x22; 4]);
        assert_eq!(dat.read_u32(targets[2]).unwrap(), MARKER);
    }
}
