//! Serialization of tables consisting of subtables linked by offsets.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ObjectId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OffsetWidth {
    U16,
    U32,
}

#[derive(Debug)]
struct Link {
    /// Position of the offset field in the object data.
    position: usize,
    width: OffsetWidth,
    target: ObjectId,
}

/// Serialized (sub)table together with offsets to other objects. Offsets are measured
/// from the start of the object containing them.
#[derive(Debug, Default)]
pub(crate) struct Object {
    data: Vec<u8>,
    links: Vec<Link>,
}

impl Object {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            links: vec![],
        }
    }

    pub(crate) fn push_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn push_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    /// Pushes a count or an index. These are bounded by the corresponding values in the original
    /// table, so they always fit into `u16`.
    pub(crate) fn push_len(&mut self, len: usize) {
        self.push_u16(u16::try_from(len).expect("length overflow"));
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends `other` to this object, retaining links from `other`.
    pub(crate) fn append(&mut self, other: Self) {
        let shift = self.data.len();
        self.links.extend(other.links.into_iter().map(|link| Link {
            position: link.position + shift,
            ..link
        }));
        self.data.extend_from_slice(&other.data);
    }

    pub(crate) fn push_offset16(&mut self, target: Option<ObjectId>) {
        self.push_link(target, OffsetWidth::U16);
    }

    pub(crate) fn push_offset32(&mut self, target: Option<ObjectId>) {
        self.push_link(target, OffsetWidth::U32);
    }

    fn push_link(&mut self, target: Option<ObjectId>, width: OffsetWidth) {
        if let Some(target) = target {
            self.links.push(Link {
                position: self.data.len(),
                width,
                target,
            });
        }
        match width {
            OffsetWidth::U16 => self.push_u16(0),
            OffsetWidth::U32 => self.push_u32(0),
        }
    }
}

/// Error returned when an offset does not fit into its field.
#[derive(Debug)]
pub(crate) struct OffsetOverflow;

/// Graph of [`Object`]s. Each object must be linked at most once.
#[derive(Debug, Default)]
pub(crate) struct TableGraph {
    objects: Vec<Object>,
}

impl TableGraph {
    pub(crate) fn add(&mut self, object: Object) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    /// Lays out objects reachable from `root` and resolves offsets between them.
    ///
    /// Objects reachable via 16-bit offsets are placed in the breadth-first order, so that parents
    /// precede their children and sibling headers are close to each other. Targets of 32-bit
    /// offsets start new groups placed after the current group.
    pub(crate) fn pack(&self, root: ObjectId) -> Result<Vec<u8>, OffsetOverflow> {
        let mut order = vec![];
        let mut is_placed = vec![false; self.objects.len()];
        let mut groups = VecDeque::from([root]);
        while let Some(group_root) = groups.pop_front() {
            if is_placed[group_root.0] {
                continue;
            }
            is_placed[group_root.0] = true;
            let mut queue = VecDeque::from([group_root]);
            while let Some(id) = queue.pop_front() {
                order.push(id);
                for link in &self.objects[id.0].links {
                    match link.width {
                        OffsetWidth::U16 if !is_placed[link.target.0] => {
                            is_placed[link.target.0] = true;
                            queue.push_back(link.target);
                        }
                        OffsetWidth::U16 => { /* already placed */ }
                        OffsetWidth::U32 => groups.push_back(link.target),
                    }
                }
            }
        }

        let mut positions = vec![0; self.objects.len()];
        let mut buffer = vec![];
        for &id in &order {
            positions[id.0] = buffer.len();
            buffer.extend_from_slice(&self.objects[id.0].data);
        }

        for &id in &order {
            let start = positions[id.0];
            for link in &self.objects[id.0].links {
                let offset = positions[link.target.0]
                    .checked_sub(start)
                    .ok_or(OffsetOverflow)?;
                let position = start + link.position;
                match link.width {
                    OffsetWidth::U16 => {
                        let offset = u16::try_from(offset).map_err(|_| OffsetOverflow)?;
                        buffer[position..position + 2].copy_from_slice(&offset.to_be_bytes());
                    }
                    OffsetWidth::U32 => {
                        let offset = u32::try_from(offset).map_err(|_| OffsetOverflow)?;
                        buffer[position..position + 4].copy_from_slice(&offset.to_be_bytes());
                    }
                }
            }
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_tree() {
        let mut graph = TableGraph::default();
        let grandchild = graph.add(Object::from_bytes(&[0xaa, 0xbb]));
        let mut child = Object::from_bytes(&[1, 1]);
        child.push_offset16(Some(grandchild));
        let child = graph.add(child);
        let sibling = graph.add(Object::from_bytes(&[2, 2]));

        let mut root = Object::default();
        root.push_u16(0x_0102);
        root.push_offset16(Some(child));
        root.push_offset16(None);
        root.push_offset16(Some(sibling));
        let root = graph.add(root);

        let packed = graph.pack(root).unwrap();
        #[rustfmt::skip]
        let expected = [
            1, 2, 0, 8, 0, 0, 0, 12, // root
            1, 1, 0, 6, // child; the grandchild is placed after the sibling
            2, 2, // sibling
            0xaa, 0xbb, // grandchild
        ];
        assert_eq!(packed, expected);
    }

    #[test]
    fn wide_offsets_start_new_group() {
        let mut graph = TableGraph::default();
        let leaf = graph.add(Object::from_bytes(&[3, 3]));
        let mut far = Object::from_bytes(&[9, 9]);
        far.push_offset16(Some(leaf));
        let far = graph.add(far);
        let near = graph.add(Object::from_bytes(&[4, 4]));

        let mut root = Object::default();
        root.push_offset32(Some(far));
        root.push_offset16(Some(near));
        let root = graph.add(root);

        let packed = graph.pack(root).unwrap();
        #[rustfmt::skip]
        let expected = [
            0, 0, 0, 8, 0, 6, // root
            4, 4, // near
            9, 9, 0, 4, // far
            3, 3, // leaf
        ];
        assert_eq!(packed, expected);
    }

    #[test]
    fn offset_overflow_is_detected() {
        let mut graph = TableGraph::default();
        let large = graph.add(Object::from_bytes(&[0; 70_000]));
        let small = graph.add(Object::from_bytes(&[1, 1]));
        let mut root = Object::default();
        root.push_offset16(Some(large));
        root.push_offset16(Some(small));
        let root = graph.add(root);
        assert!(graph.pack(root).is_err());

        let mut graph = TableGraph::default();
        let large = graph.add(Object::from_bytes(&[0; 70_000]));
        let small = graph.add(Object::from_bytes(&[1, 1]));
        let mut root = Object::default();
        root.push_offset16(Some(large));
        root.push_offset32(Some(small));
        let root = graph.add(root);
        let packed = graph.pack(root).unwrap();
        assert_eq!(packed[2..6], [0, 1, 0x11, 0x76]); // 70_006
    }
}
