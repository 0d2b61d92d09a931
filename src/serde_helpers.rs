//! Serde support, behind the `serde` feature.
//!
//! A list serializes as a plain sequence of its elements. On
//! deserialize the tree is rebuilt bottom-up and the positional index
//! is rebuilt from scratch, so the restored list is indistinguishable
//! from one constructed element by element — including when the
//! serializing build used a different node fanout.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserialize, Deserializer, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::forest::Forest;
use crate::node::{Elems, Node};
use crate::root::TreeList;
use crate::LIMIT;

impl<T: Clone + Serialize> Serialize for TreeList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

impl<'de, T: Clone + Deserialize<'de>> Deserialize<'de> for TreeList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ListVisitor<T>(PhantomData<T>);

        impl<'de, T: Clone + Deserialize<'de>> Visitor<'de> for ListVisitor<T> {
            type Value = TreeList<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut forest = Forest::new();
                let mut cur: Elems<T> = Elems::new();
                while let Some(item) = seq.next_element()? {
                    if cur.len() == LIMIT {
                        forest.append_leaf(Node::Leaf(std::mem::take(&mut cur)));
                    }
                    cur.push(item);
                }
                forest.append_leaf(Node::Leaf(cur));
                Ok(TreeList::from_built(forest.finish()))
            }
        }

        deserializer.deserialize_seq(ListVisitor(PhantomData))
    }
}
