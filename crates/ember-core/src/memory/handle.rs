/// Owning handle to a pooled object.
///
/// A valid handle always contains its object; `take` moves the object back
/// out when the handle is returned to its pool. Dropping a valid handle is a
/// programmer error caught in debug builds, since it would leak the pooled
/// object.
pub struct Handle<T> {
    inner: Option<T>,
}

impl<T> Handle<T> {
    pub fn new(data: T) -> Self {
        Self { inner: Some(data) }
    }

    /// An empty handle, used as a placeholder before an object is acquired.
    pub fn invalid() -> Self {
        Self { inner: None }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Move the object out, leaving the handle invalid.
    pub fn take(&mut self) -> T {
        self.inner.take().expect("taking an invalid handle")
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.inner.is_none(),
            "dropping a valid handle, it must be released to its pool"
        );
    }
}

impl<T> AsRef<T> for Handle<T> {
    fn as_ref(&self) -> &T {
        self.inner.as_ref().expect("invalid handle")
    }
}

impl<T> AsMut<T> for Handle<T> {
    fn as_mut(&mut self) -> &mut T {
        self.inner.as_mut().expect("invalid handle")
    }
}

impl<T> std::ops::Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl<T> std::ops::DerefMut for Handle<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut()
    }
}
