//! Response body wrapper that mirrors every data frame into a capture buffer
//! while streaming it on to the client unchanged.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::{Body, Bytes};
use galaxy_log_core::CaptureBuffer;
use http_body::{Body as HttpBody, Frame, SizeHint};

type Finalizer = Box<dyn FnOnce(Vec<u8>) + Send>;

pub struct CaptureBody {
    inner: Body,
    buffer: CaptureBuffer,
    on_complete: Option<Finalizer>,
}

impl CaptureBody {
    /// `on_complete` runs exactly once with the captured bytes: at end of
    /// stream, on the first error, or when the body is dropped unfinished.
    pub fn new<F>(inner: Body, buffer: CaptureBuffer, on_complete: F) -> Self
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        Self {
            inner,
            buffer,
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn finish(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.buffer).into_bytes());
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    if let Err(e) = this.buffer.try_append(data) {
                        this.finish();
                        return Poll::Ready(Some(Err(axum::Error::new(e))));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        self.finish();
    }
}
