use bytes::Bytes;

const INLINE_LEN: usize = 15;

pub(crate) enum ValueRef<'a> {
    Slice(&'a [u8]),
    Inline {
        offset: usize,
        value: [u8; INLINE_LEN],
    },
    Bytes(Bytes),
}

impl ValueRef<'_> {
    pub fn inline(slice: &[u8]) -> ValueRef<'static> {
        let len = slice.len();
        assert!(len < INLINE_LEN, "inline slice is too large");
        let mut value = [0u8; INLINE_LEN];
        value[INLINE_LEN - len..].copy_from_slice(slice);
        ValueRef::Inline { offset: INLINE_LEN - len, value }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueRef::Slice(items) => items.len(),
            ValueRef::Inline { offset, .. } => INLINE_LEN - offset,
            ValueRef::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ValueRef::Slice(items) => items,
            ValueRef::Inline { offset, value } => &value[*offset..],
            ValueRef::Bytes(bytes) => bytes,
        }
    }
}

impl<'a> From<&'a [u8]> for ValueRef<'a> {
    fn from(value: &'a [u8]) -> Self {
        ValueRef::Slice(value)
    }
}

impl<'a> From<&'a str> for ValueRef<'a> {
    fn from(value: &'a str) -> Self {
        ValueRef::Slice(value.as_bytes())
    }
}

impl From<Vec<u8>> for ValueRef<'static> {
    fn from(value: Vec<u8>) -> Self {
        ValueRef::Bytes(Bytes::from(value))
    }
}

impl From<String> for ValueRef<'static> {
    fn from(value: String) -> Self {
        ValueRef::Bytes(Bytes::from(value.into_bytes()))
    }
}

impl std::fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use crate::ext::FmtExt;
        self.as_slice().lossy().fmt(f)
    }
}
